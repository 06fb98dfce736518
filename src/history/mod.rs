//! Latency history module.
//!
//! Keeps a bounded window of recent measurements per service key and
//! persists it as a flat JSON snapshot.

mod models;
mod stats;
mod store;

pub use models::*;
pub use stats::*;
pub use store::*;
