//! cloudpulse - cloud endpoint latency monitor
//!
//! Probes a fixed set of endpoints with DNS, ping and HTTP checks every
//! cycle, keeps a short rolling history per endpoint and check, and flags
//! measurements that drift from their recent baseline.

pub mod config;
pub mod endpoint;
pub mod history;
pub mod probe;
pub mod scheduler;
pub mod trend;
pub mod web;
