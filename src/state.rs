use crate::json::{extract_scalar, parse_f64, parse_u64, Value};

/// Value of `message` that marks a usable document.
pub const SUCCESS_MARKER: &str = "success";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Nothing decoded yet.
    Pending,
    Success,
    Failure,
}

// Latest decoded position
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub status: Status,
    pub latitude: f64,
    pub longitude: f64,
    /// Source timestamp, seconds.
    pub observed_at: u64,
}

impl Reading {
    pub const PENDING: Reading = Reading {
        status: Status::Pending,
        latitude: 0.0,
        longitude: 0.0,
        observed_at: 0,
    };

    /// Decodes a position document. Never fails: anything missing or
    /// unreadable becomes zero, and without the success marker the reading
    /// is invalid.
    pub fn decode(document: &str) -> Self {
        let status = match extract_scalar(document, "message") {
            Ok(message) if message.as_str() == SUCCESS_MARKER => Status::Success,
            _ => Status::Failure,
        };

        Reading {
            status,
            latitude: number(document, "latitude", parse_f64),
            longitude: number(document, "longitude", parse_f64),
            observed_at: number(document, "timestamp", parse_u64),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == Status::Success
    }
}

fn number<T: Default>(document: &str, key: &str, parse: fn(&str) -> T) -> T {
    match extract_scalar(document, key) {
        Ok(Value::Text(token)) | Ok(Value::Token(token)) => parse(token),
        Ok(Value::Bracketed(_)) | Err(_) => T::default(),
    }
}

/// Single slot holding the most recent reading.
pub struct TelemetryCache {
    current: Reading,
}

impl TelemetryCache {
    pub const fn new() -> Self {
        Self {
            current: Reading::PENDING,
        }
    }

    /// Replaces the cached reading with the one decoded from `document`.
    pub fn update_from(&mut self, document: &str) -> Reading {
        self.current = Reading::decode(document);
        self.current
    }

    pub fn current(&self) -> Reading {
        self.current
    }
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new()
    }
}
