//! ESP32-C3 implementations of the transport traits.

pub mod espnow;
pub mod http;
pub mod mqtt;
pub mod wifi;
