//! ICMP ping probe with native sockets and a `ping` command fallback.
//!
//! Native echoes run in `spawn_blocking` so the timing is not skewed by the
//! async scheduler. Each probe sends [`PING_COUNT`] echoes and reports the
//! mean round trip of the replies that arrived.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

/// Echo requests sent per probe.
pub const PING_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    Native,
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

fn detect_icmp_capability() -> IcmpCapability {
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Native;
    }

    // Unprivileged on Linux when ping_group_range allows it, and on macOS
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Native;
    }

    tracing::info!("Ping probe: native ICMP unavailable, using ping command");
    IcmpCapability::CommandOnly
}

/// Ping `ip` and return the mean round-trip time.
pub async fn run_ping_probe(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);

    if capability == IcmpCapability::Native {
        let result = tokio::task::spawn_blocking(move || ping_native(ip, timeout))
            .await
            .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?;

        match result {
            Err(ProbeError::Network(msg)) if is_permission_error(&msg) => {
                tracing::warn!("Native ping to {} not permitted, falling back to command: {}", ip, msg);
            }
            other => return other,
        }
    }

    run_ping_command(ip, timeout).await
}

fn is_permission_error(msg: &str) -> bool {
    msg.contains("Permission") || msg.contains("not permitted") || msg.contains("denied")
}

/// Address-family specifics of an ICMP echo exchange.
#[derive(Debug, Clone, Copy)]
struct Family {
    domain: Domain,
    protocol: Protocol,
    request_type: u8,
    reply_type: u8,
}

impl Family {
    fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self {
                domain: Domain::IPV4,
                protocol: Protocol::ICMPV4,
                request_type: 8,
                reply_type: 0,
            },
            IpAddr::V6(_) => Self {
                domain: Domain::IPV6,
                protocol: Protocol::ICMPV6,
                request_type: 128,
                reply_type: 129,
            },
        }
    }
}

/// Blocking echo loop. Runs on a blocking thread.
fn ping_native(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let family = Family::of(ip);

    // RAW first (privileged), then DGRAM (unprivileged)
    let (mut socket, raw) = match Socket::new(family.domain, Type::RAW, Some(family.protocol)) {
        Ok(s) => (s, true),
        Err(_) => {
            let s = Socket::new(family.domain, Type::DGRAM, Some(family.protocol))
                .map_err(|e| ProbeError::Network(format!("Failed to create ICMP socket: {}", e)))?;
            (s, false)
        }
    };

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| ProbeError::Network(format!("Failed to connect: {}", e)))?;

    let identifier: u16 = rand::random();
    let mut rtts = Vec::with_capacity(PING_COUNT as usize);
    let mut last_err = None;

    for _ in 0..PING_COUNT {
        let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        match echo_once(&mut socket, family, raw, identifier, sequence, timeout) {
            Ok(rtt) => rtts.push(rtt),
            Err(e @ ProbeError::Timeout(_)) => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }

    if rtts.is_empty() {
        return Err(last_err.unwrap_or(ProbeError::Timeout(timeout)));
    }
    Ok(rtts.iter().sum::<Duration>() / rtts.len() as u32)
}

fn echo_once(
    socket: &mut Socket,
    family: Family,
    raw: bool,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let packet = build_echo_request(family, identifier, sequence);

    let start = Instant::now();
    socket.send(&packet).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ProbeError::Network(format!("Permission denied: {}", e))
        } else {
            ProbeError::Network(format!("Failed to send: {}", e))
        }
    })?;

    let mut buf = [0u8; 1500];
    loop {
        let len = socket.read(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => ProbeError::Network(format!("Failed to receive: {}", e)),
        })?;
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if is_our_reply(&buf[..len], family, raw, identifier, sequence) {
            return Ok(elapsed);
        }
        // Someone else's packet, keep waiting
    }
}

/// Check whether `packet` is the echo reply for (`identifier`, `sequence`).
///
/// Raw IPv4 sockets deliver the IP header too. DGRAM sockets have their
/// identifier rewritten by the kernel, which already filters replies per
/// socket, so only the sequence is compared there.
fn is_our_reply(packet: &[u8], family: Family, raw: bool, identifier: u16, sequence: u16) -> bool {
    let offset = if packet.first().map(|b| b >> 4) == Some(4) {
        ((packet[0] & 0x0F) as usize) * 4
    } else {
        0
    };
    let icmp = match packet.get(offset..offset + 8) {
        Some(header) => header,
        None => return false,
    };

    let reply_id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let reply_seq = u16::from_be_bytes([icmp[6], icmp[7]]);

    icmp[0] == family.reply_type && reply_seq == sequence && (!raw || reply_id == identifier)
}

/// Build an ICMP/ICMPv6 echo request with a 56-byte payload.
fn build_echo_request(family: Family, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = family.request_type;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    // The kernel fills in the ICMPv6 checksum
    if family.request_type == 8 {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    packet
}

/// Internet checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]) as u32,
            [hi] => (*hi as u32) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

async fn run_ping_command(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    // macOS takes the per-reply wait in milliseconds, Linux in seconds
    let wait = if cfg!(target_os = "macos") {
        timeout.as_millis().max(1).to_string()
    } else {
        timeout.as_secs().max(1).to_string()
    };

    let output = Command::new("ping")
        .args(["-c", &PING_COUNT.to_string(), "-W", &wait, &ip.to_string()])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout")
            || stdout.contains("100% packet loss")
            || stdout.contains("100.0% packet loss")
        {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command("ping failed".to_string()));
    }

    parse_ping_output(&stdout)
}

/// Extract the average round trip from `ping` output.
///
/// Prefers the summary line (Linux `rtt`, BSD/macOS `round-trip`) and falls
/// back to averaging the per-reply `time=` fields.
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    static SUMMARY: OnceLock<Regex> = OnceLock::new();
    let summary = SUMMARY.get_or_init(|| {
        Regex::new(r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*[0-9.]+/([0-9.]+)/")
            .expect("valid regex")
    });

    if let Some(avg) = summary
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return millis_to_duration(avg);
    }

    static PER_REPLY: OnceLock<Regex> = OnceLock::new();
    let per_reply =
        PER_REPLY.get_or_init(|| Regex::new(r"time[=<]([0-9.]+)\s*ms").expect("valid regex"));

    let times: Vec<f64> = per_reply
        .captures_iter(output)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    if !times.is_empty() {
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        return millis_to_duration(avg);
    }

    Err(ProbeError::Command("could not parse ping output".to_string()))
}

fn millis_to_duration(ms: f64) -> Result<Duration, ProbeError> {
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|e| ProbeError::Command(format!("invalid ping time {}ms: {}", ms, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4() -> Family {
        Family::of(IpAddr::from([8, 8, 8, 8]))
    }

    fn close(d: Duration, ms: f64) -> bool {
        (d.as_secs_f64() * 1000.0 - ms).abs() < 1e-3
    }

    #[test]
    fn test_icmp_checksum_verifies() {
        let packet = build_echo_request(v4(), 0x1234, 0x0001);
        // A packet with a correct checksum sums to zero
        assert_eq!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn test_icmp_checksum_odd_length() {
        assert_eq!(icmp_checksum(&[0xFF]), 0x00FF);
        assert_eq!(icmp_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_build_echo_request() {
        let packet = build_echo_request(v4(), 0x1234, 0x0001);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(packet[4..6], [0x12, 0x34]);
        assert_eq!(packet[6..8], [0x00, 0x01]);

        let v6 = build_echo_request(Family::of("::1".parse().unwrap()), 1, 2);
        assert_eq!(v6[0], 128);
        assert_eq!(v6[2..4], [0, 0]);
    }

    #[test]
    fn test_reply_matching() {
        let mut reply = vec![0u8; 8];
        reply[0] = 0;
        reply[4..6].copy_from_slice(&0xBEEFu16.to_be_bytes());
        reply[6..8].copy_from_slice(&7u16.to_be_bytes());

        assert!(is_our_reply(&reply, v4(), true, 0xBEEF, 7));
        assert!(!is_our_reply(&reply, v4(), true, 0xBEEF, 8));
        assert!(!is_our_reply(&reply, v4(), true, 0x1111, 7));
        // DGRAM sockets ignore the rewritten identifier
        assert!(is_our_reply(&reply, v4(), false, 0x1111, 7));

        // Same reply behind a 20-byte IPv4 header
        let mut with_ip = vec![0u8; 20];
        with_ip[0] = 0x45;
        with_ip.extend_from_slice(&reply);
        assert!(is_our_reply(&with_ip, v4(), true, 0xBEEF, 7));

        assert!(!is_our_reply(&reply[..6], v4(), false, 0, 7));
    }

    #[test]
    fn test_parse_ping_output_linux_summary() {
        let output = r#"PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.3 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=14.1 ms
64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=13.2 ms

--- 8.8.8.8 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 12.300/13.200/14.100/0.735 ms"#;
        let latency = parse_ping_output(output).unwrap();
        assert!(close(latency, 13.2));
    }

    #[test]
    fn test_parse_ping_output_macos_summary() {
        let output = r#"PING google.com (142.250.69.174): 56 data bytes

--- google.com ping statistics ---
3 packets transmitted, 3 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 17.906/18.250/19.001/0.457 ms"#;
        let latency = parse_ping_output(output).unwrap();
        assert!(close(latency, 18.25));
    }

    #[test]
    fn test_parse_ping_output_per_reply_only() {
        let output = "64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=10.0 ms\n\
                      64 bytes from 8.8.8.8: icmp_seq=2 ttl=117 time=20.0 ms";
        let latency = parse_ping_output(output).unwrap();
        assert!(close(latency, 15.0));
    }

    #[test]
    fn test_parse_ping_output_out_of_range() {
        let huge = "9".repeat(400);
        let summary = format!("rtt min/avg/max/mdev = 1.0/{}/2.0/0.1 ms", huge);
        assert!(matches!(parse_ping_output(&summary), Err(ProbeError::Command(_))));

        let per_reply = format!("64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time={} ms", huge);
        assert!(matches!(parse_ping_output(&per_reply), Err(ProbeError::Command(_))));
    }

    #[test]
    fn test_parse_ping_output_garbage() {
        assert!(parse_ping_output("ping: unknown host").is_err());
    }
}
