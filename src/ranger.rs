//! HC-SR04 ultrasonic ranging, the node's job before it relayed positions.

use core::fmt::Write;
use embassy_time::Duration;
use heapless::String;

use crate::publish::{Session, SessionFault};

/// Longer echoes are treated as no echo (~5 m, past the sensor's range).
pub const MAX_ECHO_US: u64 = 30_000;

/// Round trip of sound, microseconds per centimetre.
const US_PER_CM: u64 = 58;

pub const TOPIC: &str = "outTopic2";
pub const PERIOD: Duration = Duration::from_secs(1);

/// Broker reconnects tried before giving up for this cycle.
pub const CONNECT_ATTEMPTS: u8 = 3;
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// `None` when no echo came back.
pub fn echo_to_cm(echo_us: u64) -> Option<u32> {
    if echo_us == 0 || echo_us > MAX_ECHO_US {
        return None;
    }
    Some((echo_us / US_PER_CM) as u32)
}

pub fn distance_payload(distance_cm: Option<u32>) -> String<64> {
    let mut out = String::new();
    // Both shapes are well under 64 bytes
    let _ = match distance_cm {
        Some(cm) => write!(out, "{{\"distance_cm\":{}}}", cm),
        None => out.write_str("{\"distance_cm\":null,\"note\":\"pas_echo\"}"),
    };
    out
}

/// Publishes one measurement on [`TOPIC`].
pub async fn report<S: Session>(session: &mut S, distance_cm: Option<u32>) -> Result<(), SessionFault> {
    let payload = distance_payload(distance_cm);
    session.publish(TOPIC, payload.as_bytes()).await
}
