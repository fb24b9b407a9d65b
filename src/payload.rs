use core::fmt::Write;
use heapless::String;

use crate::state::Reading;

/// Room for two absurd coordinates; real ones need ~70 bytes. Kept above the
/// radio frame limit so oversize output reaches the relay's truncation step.
pub const POSITION_CAPACITY: usize = 320;

/// `{"latitude":<6 dp>,"longitude":<6 dp>,"timestamp":<u64>}` into a fresh buffer.
///
/// On overflow the error carries whatever was written before it.
pub fn position(reading: &Reading) -> Result<String<POSITION_CAPACITY>, String<POSITION_CAPACITY>> {
    let mut out = String::new();
    match write!(
        out,
        "{{\"latitude\":{:.6},\"longitude\":{:.6},\"timestamp\":{}}}",
        reading.latitude, reading.longitude, reading.observed_at
    ) {
        Ok(()) => Ok(out),
        Err(_) => Err(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Status;

    fn reading(latitude: f64, longitude: f64, observed_at: u64) -> Reading {
        Reading {
            status: Status::Success,
            latitude,
            longitude,
            observed_at,
        }
    }

    #[test]
    fn six_decimal_places() {
        let out = position(&reading(45.5017, -73.5673, 1_718_000_000)).unwrap();
        assert_eq!(
            out.as_str(),
            r#"{"latitude":45.501700,"longitude":-73.567300,"timestamp":1718000000}"#
        );
    }

    #[test]
    fn rounds_past_six_places() {
        let out = position(&reading(0.1234567, 0.0, 0)).unwrap();
        assert!(out.starts_with(r#"{"latitude":0.123457,"longitude":0.000000,"#));
    }

    #[test]
    fn overflow_keeps_the_prefix() {
        let partial = position(&reading(1e300, 1e300, 1)).unwrap_err();
        assert!(partial.starts_with(r#"{"latitude":"#));
        assert!(!partial.contains("timestamp"));
        assert!(partial.len() <= POSITION_CAPACITY);
    }
}
