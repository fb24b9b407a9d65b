//! Best-effort relay of the cached reading to one paired peer over the radio.

use core::fmt;

use crate::config::FRAME_LIMIT;
use crate::fmt::{debug, error, warn};
use crate::payload;
use crate::state::Reading;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    pub const BROADCAST: PeerAddress = PeerAddress([0xff; 6]);

    /// `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut octets = [0u8; 6];
        let mut parts = text.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *octet = u8::from_str_radix(part, 16).ok()?;
        }

        match parts.next() {
            Some(_) => None,
            None => Some(PeerAddress(octets)),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PeerAddress {
    fn format(&self, f: defmt::Formatter) {
        let [a, b, c, d, e, g] = self.0;
        defmt::write!(f, "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}", a, b, c, d, e, g)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioFault {
    /// Peer registration failed at startup.
    NotInitialized,
    /// Outgoing frame queue is full.
    Busy,
    Driver,
}

impl fmt::Display for RadioFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioFault::NotInitialized => f.write_str("radio not initialized"),
            RadioFault::Busy => f.write_str("radio queue full"),
            RadioFault::Driver => f.write_str("radio driver error"),
        }
    }
}

/// Asynchronous per-frame delivery result from the radio layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeliveryReport {
    pub peer: PeerAddress,
    pub delivered: bool,
}

/// Connectionless peer radio. `send` only queues; the result of the actual
/// transmission shows up later through `poll_report`.
pub trait PeerRadio {
    fn send(&mut self, peer: &PeerAddress, frame: &[u8]) -> Result<(), RadioFault>;

    fn poll_report(&mut self) -> Option<DeliveryReport>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayOutcome {
    Sent,
    SkippedInvalid,
    SkippedNotReady,
    /// Sent, but cut to the frame limit.
    Truncated,
    Rejected(RadioFault),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayStats {
    pub sent: u32,
    pub truncated: u32,
    pub delivered: u32,
    pub undelivered: u32,
}

pub struct Relay<R> {
    // None when peer registration failed; stays that way until reset
    radio: Option<R>,
    peer: PeerAddress,
    stats: RelayStats,
}

impl<R: PeerRadio> Relay<R> {
    pub fn new(radio: Result<R, RadioFault>, peer: PeerAddress) -> Self {
        let radio = match radio {
            Ok(radio) => Some(radio),
            Err(fault) => {
                error!("peer radio unavailable ({:?}), relay disabled", fault);
                None
            }
        };

        Self {
            radio,
            peer,
            stats: RelayStats::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.radio.is_some()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn radio(&self) -> Option<&R> {
        self.radio.as_ref()
    }

    /// Sends `reading` whether or not it went out before.
    pub fn maybe_relay(&mut self, reading: &Reading) -> RelayOutcome {
        if self.radio.is_none() {
            return RelayOutcome::SkippedNotReady;
        }
        if !reading.is_valid() {
            return RelayOutcome::SkippedInvalid;
        }

        // An overflowing serialization is relayed as far as it got
        let frame = match payload::position(reading) {
            Ok(frame) | Err(frame) => frame,
        };

        self.transmit(frame.as_bytes())
    }

    /// Queues `frame`, cut to the radio frame limit. A cut frame is usually
    /// no longer valid JSON; it is sent anyway.
    pub fn transmit(&mut self, frame: &[u8]) -> RelayOutcome {
        let Some(radio) = self.radio.as_mut() else {
            return RelayOutcome::SkippedNotReady;
        };

        let truncated = frame.len() > FRAME_LIMIT;
        let frame = &frame[..frame.len().min(FRAME_LIMIT)];

        if let Err(fault) = radio.send(&self.peer, frame) {
            warn!("relay to {} refused: {:?}", self.peer, fault);
            return RelayOutcome::Rejected(fault);
        }

        self.stats.sent += 1;
        if truncated {
            self.stats.truncated += 1;
            warn!("relay frame cut to {} bytes", FRAME_LIMIT);
            RelayOutcome::Truncated
        } else {
            debug!("relayed {} bytes to {}", frame.len(), self.peer);
            RelayOutcome::Sent
        }
    }

    /// Folds pending delivery reports into the stats. Never waits.
    pub fn drain_reports(&mut self) -> usize {
        let Some(radio) = self.radio.as_mut() else {
            return 0;
        };

        let mut drained = 0;
        while let Some(report) = radio.poll_report() {
            drained += 1;
            if report.delivered {
                self.stats.delivered += 1;
            } else {
                self.stats.undelivered += 1;
                warn!("frame to {} not delivered", report.peer);
            }
        }
        drained
    }
}
