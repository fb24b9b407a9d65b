use embassy_time::Duration;

use crate::fmt::warn;
use crate::relay::PeerAddress;

/// Compile-time string with a fallback, e.g. `RELAY_WIFI_SSID=... cargo build`.
macro_rules! env_or {
    ($name:literal, $default:expr) => {
        match option_env!($name) {
            Some(value) => value,
            None => $default,
        }
    };
}

pub const WIFI_SSID: &str = env_or!("RELAY_WIFI_SSID", "");
pub const WIFI_PASSWORD: &str = env_or!("RELAY_WIFI_PASSWORD", "");

pub const BROKER_HOST: &str = env_or!("RELAY_BROKER_HOST", "maisonneuve.aws.thinger.io");
pub const BROKER_PORT: &str = env_or!("RELAY_BROKER_PORT", "1883");
pub const BROKER_USER: &str = env_or!("RELAY_BROKER_USER", "");
pub const BROKER_PASSWORD: &str = env_or!("RELAY_BROKER_PASSWORD", "");
pub const CLIENT_ID: &str = env_or!("RELAY_CLIENT_ID", "esp2Ow");

pub const ENDPOINT: &str = env_or!("RELAY_ENDPOINT", "http://api.open-notify.org/iss-now.json");
pub const TOPIC: &str = env_or!("RELAY_TOPIC", "iss/position");
pub const PEER: &str = env_or!("RELAY_PEER", "ff:ff:ff:ff:ff:ff");

pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// ESP-NOW hard limit on a single frame.
pub const FRAME_LIMIT: usize = 250;

/// Largest HTTP body we keep for one poll. The position document is ~150 bytes.
pub const BODY_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub endpoint: &'static str,
    pub topic: &'static str,
    pub peer: PeerAddress,
    pub poll_interval: Duration,
    pub relay_interval: Duration,
    /// Reassociation attempts made in one iteration before giving up on it.
    pub association_attempts: u16,
    /// Log progress every this many failed reassociation attempts.
    pub association_report_every: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: "http://api.open-notify.org/iss-now.json",
            topic: "iss/position",
            peer: PeerAddress::BROADCAST,
            poll_interval: Duration::from_secs(10),
            relay_interval: Duration::from_secs(2),
            association_attempts: 20,
            association_report_every: 5,
        }
    }
}

impl Settings {
    /// Defaults overridden by whatever was baked in through `RELAY_*` variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: ENDPOINT,
            topic: TOPIC,
            peer: peer_or_broadcast(PEER),
            ..Self::default()
        }
    }
}

pub fn broker_port() -> u16 {
    port_or_default(BROKER_PORT)
}

fn port_or_default(text: &str) -> u16 {
    match text.trim().parse() {
        Ok(0) | Err(_) => {
            warn!("'{}' is not a broker port, using {}", text, DEFAULT_BROKER_PORT);
            DEFAULT_BROKER_PORT
        }
        Ok(port) => port,
    }
}

fn peer_or_broadcast(text: &str) -> PeerAddress {
    match PeerAddress::parse(text) {
        Some(peer) => peer,
        None => {
            warn!("'{}' is not a peer MAC address, using broadcast", text);
            PeerAddress::BROADCAST
        }
    }
}
