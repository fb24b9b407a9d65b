//! The relay loop body: link upkeep, two independent timers, two transports.

use embassy_time::{Duration, Instant};

use crate::config::{Settings, BODY_CAPACITY};
use crate::fmt::{error, info, warn};
use crate::poll::{poll, HttpClient, Link, PollOutcome, TransportFault};
use crate::publish::{PublishOutcome, Publisher, Session};
use crate::relay::{PeerRadio, Relay, RelayOutcome};
use crate::state::{Reading, TelemetryCache};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    LinkDown,
    Associating,
    Associated,
}

/// Wall-clock timer: due on the first check, then `period` after each firing.
#[derive(Clone, Copy, Debug)]
pub struct Cadence {
    period: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub const fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollSummary {
    Decoded(Reading),
    TransportError(TransportFault),
    LinkDown,
}

/// What one iteration did.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepReport {
    pub link: LinkState,
    pub session_connected: bool,
    pub poll: Option<PollSummary>,
    pub publish: Option<PublishOutcome>,
    pub relay: Option<RelayOutcome>,
}

/// Debug-level dump of a fetched document. Only rendered when someone is
/// listening; defmt filters at compile time and gets the raw text.
fn dump_document(status: u16, document: &str) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "defmt")] {
            defmt::debug!("http {}: {=str}", status, document);
        } else if #[cfg(feature = "log")] {
            if log::log_enabled!(log::Level::Debug) {
                let mut readable = heapless::String::<512>::new();
                let cut = if crate::json::render_readable(document, &mut readable).is_err() {
                    " (cut)"
                } else {
                    ""
                };
                log::debug!("http {}{}:\n{}", status, cut, readable.as_str());
            }
        } else {
            let _ = (status, document);
        }
    }
}

pub struct Driver<L, H, S, R> {
    settings: Settings,
    link: L,
    http: H,
    session: S,
    relay: Relay<R>,
    cache: TelemetryCache,
    publisher: Publisher,
    poll_timer: Cadence,
    relay_timer: Cadence,
    link_state: LinkState,
    body: [u8; BODY_CAPACITY],
}

impl<L, H, S, R> Driver<L, H, S, R>
where
    L: Link,
    H: HttpClient,
    S: Session,
    R: PeerRadio,
{
    pub fn new(settings: Settings, link: L, http: H, session: S, relay: Relay<R>) -> Self {
        Self {
            publisher: Publisher::new(settings.topic),
            poll_timer: Cadence::new(settings.poll_interval),
            relay_timer: Cadence::new(settings.relay_interval),
            settings,
            link,
            http,
            session,
            relay,
            cache: TelemetryCache::new(),
            link_state: LinkState::LinkDown,
            body: [0; BODY_CAPACITY],
        }
    }

    /// One pass of the loop. Never fails; whatever went wrong is logged and
    /// shows up as a skipped action in the report.
    pub async fn step(&mut self, now: Instant) -> StepReport {
        self.relay.drain_reports();

        if !self.link.is_up() {
            if self.link_state == LinkState::Associated {
                warn!("network association lost");
            }
            self.reassociate().await;
            return StepReport {
                link: self.link_state,
                session_connected: self.session.is_connected(),
                poll: None,
                publish: None,
                relay: None,
            };
        }
        self.link_state = LinkState::Associated;

        if !self.session.is_connected() {
            match self.session.connect().await {
                Ok(()) => info!("broker session established"),
                Err(fault) => warn!("broker connect failed: {}", fault.as_str()),
            }
        }

        if let Err(fault) = self.session.pump().await {
            warn!("broker session dropped: {}", fault.as_str());
        }

        let mut report = StepReport {
            link: self.link_state,
            session_connected: self.session.is_connected(),
            poll: None,
            publish: None,
            relay: None,
        };

        if self.poll_timer.fire(now) {
            report.poll = Some(self.poll_cycle().await);
            let reading = self.cache.current();
            report.publish = Some(self.publisher.maybe_publish(&mut self.session, &reading).await);
        }

        // Independent of the poll above and of whether the reading was published
        if self.relay_timer.fire(now) {
            report.relay = Some(self.relay.maybe_relay(&self.cache.current()));
        }

        report
    }

    async fn reassociate(&mut self) {
        self.link_state = LinkState::Associating;
        let budget = self.settings.association_attempts;
        let report_every = self.settings.association_report_every.max(1);

        for attempt in 1..=budget {
            match self.link.associate().await {
                Ok(()) => {
                    info!("network associated after {} attempt(s)", attempt);
                    self.link_state = LinkState::Associated;
                    return;
                }
                Err(fault) => {
                    if attempt % report_every == 0 {
                        warn!("associating, attempt {}/{}: {:?}", attempt, budget, fault);
                    }
                }
            }
        }

        error!("network association failed after {} attempts", budget);
        self.link_state = LinkState::LinkDown;
    }

    async fn poll_cycle(&mut self) -> PollSummary {
        match poll(&self.link, &mut self.http, self.settings.endpoint, &mut self.body).await {
            PollOutcome::Delivered { status, document } => {
                dump_document(status, document);

                let reading = self.cache.update_from(document);
                if reading.is_valid() {
                    info!(
                        "position {} {} at {}",
                        reading.latitude, reading.longitude, reading.observed_at
                    );
                } else {
                    warn!("document rejected (http {})", status);
                }
                PollSummary::Decoded(reading)
            }
            PollOutcome::TransportError(fault) => PollSummary::TransportError(fault),
            PollOutcome::LinkDown => PollSummary::LinkDown,
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn reading(&self) -> Reading {
        self.cache.current()
    }

    pub fn watermark(&self) -> u64 {
        self.publisher.watermark()
    }

    pub fn relay(&self) -> &Relay<R> {
        &self.relay
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn http_mut(&mut self) -> &mut H {
        &mut self.http
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }
}
