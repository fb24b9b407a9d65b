//! ESP-NOW peer radio.
//!
//! `PeerRadio::send` must not block the loop, so frames go through a small
//! outbox to a sender task, and the task posts one delivery report per frame.

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use esp_wifi::esp_now::{
    EspNow, EspNowManager, EspNowReceiver, EspNowSender, EspNowWithWifiCreateToken, PeerInfo,
};
use esp_wifi::EspWifiController;
use heapless::Vec;

use crate::config::FRAME_LIMIT;
use crate::fmt::{error, info, trace};
use crate::relay::{DeliveryReport, PeerAddress, PeerRadio, RadioFault};

type Frame = Vec<u8, FRAME_LIMIT>;

static OUTBOX: Channel<CriticalSectionRawMutex, (PeerAddress, Frame), 4> = Channel::new();
static REPORTS: Channel<CriticalSectionRawMutex, DeliveryReport, 8> = Channel::new();

/// Handle on the sender task's queues.
pub struct EspNowRadio {
    _private: (),
}

impl PeerRadio for EspNowRadio {
    fn send(&mut self, peer: &PeerAddress, frame: &[u8]) -> Result<(), RadioFault> {
        let frame = Frame::from_slice(frame).map_err(|_| RadioFault::Driver)?;
        OUTBOX.try_send((*peer, frame)).map_err(|_| RadioFault::Busy)
    }

    fn poll_report(&mut self) -> Option<DeliveryReport> {
        REPORTS.try_receive().ok()
    }
}

#[embassy_executor::task]
async fn sender(
    // Held so the driver stays initialised
    _manager: EspNowManager<'static>,
    mut sender: EspNowSender<'static>,
    _receiver: EspNowReceiver<'static>,
) -> ! {
    loop {
        let (peer, frame) = OUTBOX.receive().await;
        let delivered = sender.send_async(&peer.0, &frame).await.is_ok();
        if REPORTS.try_send(DeliveryReport { peer, delivered }).is_err() {
            trace!("delivery report for {} dropped", peer);
        }
    }
}

/// Brings ESP-NOW up alongside station-mode Wi-Fi and registers `peer`.
/// Any failure here is final: the caller's relay stays disabled.
pub fn start(
    spawner: &Spawner,
    init: &'static EspWifiController<'static>,
    token: EspNowWithWifiCreateToken,
    peer: PeerAddress,
) -> Result<EspNowRadio, RadioFault> {
    let esp_now = EspNow::new_with_wifi(init, token).map_err(|e| {
        error!("esp-now init failed: {:?}", e);
        RadioFault::NotInitialized
    })?;

    if !esp_now.peer_exists(&peer.0) {
        esp_now
            .add_peer(PeerInfo {
                peer_address: peer.0,
                lmk: None,
                channel: None,
                encrypt: false,
            })
            .map_err(|e| {
                error!("esp-now peer {} refused: {:?}", peer, e);
                RadioFault::NotInitialized
            })?;
    }

    let (manager, tx, rx) = esp_now.split();
    spawner.spawn(sender(manager, tx, rx)).map_err(|_| {
        error!("esp-now sender task could not be spawned");
        RadioFault::NotInitialized
    })?;

    info!("esp-now ready, peer {}", peer);
    Ok(EspNowRadio { _private: () })
}
