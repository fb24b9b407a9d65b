use core::fmt;

use crate::fmt::{debug, info, warn};
use crate::payload;
use crate::state::Reading;

/// Classic MQTT client state codes.
pub mod client_state {
    pub const CONNECTION_TIMEOUT: i8 = -4;
    pub const CONNECTION_LOST: i8 = -3;
    pub const CONNECT_FAILED: i8 = -2;
    pub const DISCONNECTED: i8 = -1;
    pub const CONNECTED: i8 = 0;
    pub const BAD_PROTOCOL: i8 = 1;
    pub const BAD_CLIENT_ID: i8 = 2;
    pub const UNAVAILABLE: i8 = 3;
    pub const BAD_CREDENTIALS: i8 = 4;
    pub const UNAUTHORIZED: i8 = 5;
}

/// Broker session failures, numbered like the classic client state codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionFault {
    ConnectionTimeout,
    ConnectionLost,
    ConnectFailed,
    Disconnected,
    BadProtocol,
    BadClientId,
    Unavailable,
    BadCredentials,
    Unauthorized,
    /// Serialized payload did not fit the publish buffer.
    PayloadTooLarge,
    Unknown(i8),
}

impl SessionFault {
    /// `None` for state 0, which means connected.
    pub fn from_state(code: i8) -> Option<Self> {
        let fault = match code {
            client_state::CONNECTION_TIMEOUT => SessionFault::ConnectionTimeout,
            client_state::CONNECTION_LOST => SessionFault::ConnectionLost,
            client_state::CONNECT_FAILED => SessionFault::ConnectFailed,
            client_state::DISCONNECTED => SessionFault::Disconnected,
            client_state::CONNECTED => return None,
            client_state::BAD_PROTOCOL => SessionFault::BadProtocol,
            client_state::BAD_CLIENT_ID => SessionFault::BadClientId,
            client_state::UNAVAILABLE => SessionFault::Unavailable,
            client_state::BAD_CREDENTIALS => SessionFault::BadCredentials,
            client_state::UNAUTHORIZED => SessionFault::Unauthorized,
            other => SessionFault::Unknown(other),
        };
        Some(fault)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFault::ConnectionTimeout => "MQTT_CONNECTION_TIMEOUT",
            SessionFault::ConnectionLost => "MQTT_CONNECTION_LOST",
            SessionFault::ConnectFailed => "MQTT_CONNECT_FAILED",
            SessionFault::Disconnected => "MQTT_DISCONNECTED",
            SessionFault::BadProtocol => "MQTT_CONNECT_BAD_PROTOCOL",
            SessionFault::BadClientId => "MQTT_CONNECT_BAD_CLIENT_ID",
            SessionFault::Unavailable => "MQTT_CONNECT_UNAVAILABLE",
            SessionFault::BadCredentials => "MQTT_CONNECT_BAD_CREDENTIALS",
            SessionFault::Unauthorized => "MQTT_CONNECT_UNAUTHORIZED",
            SessionFault::PayloadTooLarge => "MQTT_PAYLOAD_TOO_LARGE",
            SessionFault::Unknown(_) => "MQTT_UNKNOWN",
        }
    }
}

impl fmt::Display for SessionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reliable pub/sub session to the broker.
#[allow(async_fn_in_trait)]
pub trait Session {
    fn is_connected(&self) -> bool;

    /// A single connect attempt, no retries.
    async fn connect(&mut self) -> Result<(), SessionFault>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionFault>;

    /// Keep-alive and inbound traffic. Must run every iteration, subscribed or not.
    async fn pump(&mut self) -> Result<(), SessionFault>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    Sent,
    SkippedStale,
    SkippedInvalid,
    SkippedDisconnected,
    Failed(SessionFault),
}

/// Publishes each reading once, tracked by the last delivered timestamp.
pub struct Publisher {
    topic: &'static str,
    // 0 doubles as "nothing delivered yet"; a real reading stamped 0 is never sent
    watermark: u64,
}

impl Publisher {
    pub const fn new(topic: &'static str) -> Self {
        Self { topic, watermark: 0 }
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub async fn maybe_publish<S: Session>(&mut self, session: &mut S, reading: &Reading) -> PublishOutcome {
        if !reading.is_valid() {
            return PublishOutcome::SkippedInvalid;
        }
        if reading.observed_at == self.watermark {
            return PublishOutcome::SkippedStale;
        }
        if !session.is_connected() {
            debug!("session down, holding reading {}", reading.observed_at);
            return PublishOutcome::SkippedDisconnected;
        }

        let message = match payload::position(reading) {
            Ok(message) => message,
            Err(_) => {
                warn!("position payload overflow at {}", reading.observed_at);
                return PublishOutcome::Failed(SessionFault::PayloadTooLarge);
            }
        };

        match session.publish(self.topic, message.as_bytes()).await {
            Ok(()) => {
                self.watermark = reading.observed_at;
                info!("published {} to {}", reading.observed_at, self.topic);
                PublishOutcome::Sent
            }
            Err(fault) => {
                warn!("publish failed: {}", fault.as_str());
                PublishOutcome::Failed(fault)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Status;
    use crate::testing::FakeSession;
    use embassy_futures::block_on;

    fn reading(observed_at: u64) -> Reading {
        Reading {
            status: Status::Success,
            latitude: 10.0,
            longitude: 20.0,
            observed_at,
        }
    }

    #[test]
    fn each_timestamp_goes_out_once() {
        let mut session = FakeSession::connected();
        let mut publisher = Publisher::new("iss/position");

        let outcomes = [5, 5, 7].map(|ts| block_on(publisher.maybe_publish(&mut session, &reading(ts))));

        assert_eq!(
            outcomes,
            [PublishOutcome::Sent, PublishOutcome::SkippedStale, PublishOutcome::Sent]
        );
        assert_eq!(session.published.len(), 2);
        assert_eq!(publisher.watermark(), 7);
    }

    #[test]
    fn payload_and_topic() {
        let mut session = FakeSession::connected();
        let mut publisher = Publisher::new("iss/position");

        block_on(publisher.maybe_publish(&mut session, &reading(42)));

        let (topic, payload) = &session.published[0];
        assert_eq!(topic.as_str(), "iss/position");
        assert_eq!(
            payload.as_str(),
            r#"{"latitude":10.000000,"longitude":20.000000,"timestamp":42}"#
        );
    }

    #[test]
    fn invalid_readings_are_never_published() {
        let mut session = FakeSession::connected();
        let mut publisher = Publisher::new("t");

        let outcome = block_on(publisher.maybe_publish(&mut session, &Reading::PENDING));
        assert_eq!(outcome, PublishOutcome::SkippedInvalid);

        let failed = Reading {
            status: Status::Failure,
            ..reading(3)
        };
        let outcome = block_on(publisher.maybe_publish(&mut session, &failed));
        assert_eq!(outcome, PublishOutcome::SkippedInvalid);
        assert!(session.published.is_empty());
    }

    #[test]
    fn disconnected_session_holds_the_reading() {
        let mut session = FakeSession::disconnected();
        let mut publisher = Publisher::new("t");

        let outcome = block_on(publisher.maybe_publish(&mut session, &reading(8)));

        assert_eq!(outcome, PublishOutcome::SkippedDisconnected);
        assert_eq!(session.connects, 0);
        assert_eq!(publisher.watermark(), 0);
    }

    #[test]
    fn failed_publish_is_retried_next_time() {
        let mut session = FakeSession::connected();
        session.publish_fault = Some(SessionFault::ConnectionLost);
        let mut publisher = Publisher::new("t");

        let outcome = block_on(publisher.maybe_publish(&mut session, &reading(8)));
        assert_eq!(outcome, PublishOutcome::Failed(SessionFault::ConnectionLost));
        assert_eq!(publisher.watermark(), 0);

        session.publish_fault = None;
        let outcome = block_on(publisher.maybe_publish(&mut session, &reading(8)));
        assert_eq!(outcome, PublishOutcome::Sent);
        assert_eq!(publisher.watermark(), 8);
    }

    #[test]
    fn timestamp_zero_collides_with_the_initial_watermark() {
        let mut session = FakeSession::connected();
        let mut publisher = Publisher::new("t");

        let outcome = block_on(publisher.maybe_publish(&mut session, &reading(0)));
        assert_eq!(outcome, PublishOutcome::SkippedStale);
    }

    #[test]
    fn state_codes_map_to_names() {
        assert_eq!(SessionFault::from_state(0), None);
        assert_eq!(SessionFault::from_state(-4).map(|f| f.as_str()), Some("MQTT_CONNECTION_TIMEOUT"));
        assert_eq!(SessionFault::from_state(-1).map(|f| f.as_str()), Some("MQTT_DISCONNECTED"));
        assert_eq!(SessionFault::from_state(4).map(|f| f.as_str()), Some("MQTT_CONNECT_BAD_CREDENTIALS"));
        assert_eq!(SessionFault::from_state(5), Some(SessionFault::Unauthorized));
        assert_eq!(SessionFault::from_state(9), Some(SessionFault::Unknown(9)));
        assert_eq!(SessionFault::Unknown(9).as_str(), "MQTT_UNKNOWN");
        assert_eq!(SessionFault::from_state(client_state::CONNECTION_LOST), Some(SessionFault::ConnectionLost));
        assert_eq!(SessionFault::from_state(client_state::BAD_CLIENT_ID), Some(SessionFault::BadClientId));
    }
}
