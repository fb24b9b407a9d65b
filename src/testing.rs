//! Transport doubles for host tests.

use core::cell::Cell;
use std::collections::VecDeque;

use crate::poll::{HttpClient, HttpRequest, Link, LinkFault, Response, TransportFault};
use crate::publish::{Session, SessionFault};
use crate::relay::{DeliveryReport, PeerAddress, PeerRadio, RadioFault};

pub struct FakeLink {
    pub up: bool,
    /// Attempts needed before association succeeds; `None` never succeeds.
    pub succeed_on: Option<u32>,
    pub attempts: u32,
}

impl FakeLink {
    pub fn up() -> Self {
        Self {
            up: true,
            succeed_on: Some(1),
            attempts: 0,
        }
    }

    pub fn down() -> Self {
        Self {
            up: false,
            succeed_on: None,
            attempts: 0,
        }
    }
}

impl Link for FakeLink {
    fn is_up(&self) -> bool {
        self.up
    }

    async fn associate(&mut self) -> Result<(), LinkFault> {
        self.attempts += 1;
        match self.succeed_on {
            Some(n) if self.attempts >= n => {
                self.up = true;
                Ok(())
            }
            _ => Err(LinkFault::Timeout),
        }
    }
}

#[derive(Clone, Copy)]
pub enum Scripted {
    Body(u16, &'static str),
    Bytes(u16, &'static [u8]),
    Fault(TransportFault),
}

pub struct FakeHttp {
    pub script: Scripted,
    pub refuse_begin: Option<TransportFault>,
    pub begins: Cell<u32>,
    pub releases: Cell<u32>,
}

impl FakeHttp {
    pub fn new(script: Scripted) -> Self {
        Self {
            script,
            refuse_begin: None,
            begins: Cell::new(0),
            releases: Cell::new(0),
        }
    }
}

pub struct FakeRequest<'a> {
    script: Scripted,
    releases: &'a Cell<u32>,
}

impl Drop for FakeRequest<'_> {
    fn drop(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }
}

impl HttpClient for FakeHttp {
    type Request<'a> = FakeRequest<'a>;

    async fn begin<'a>(&'a mut self, _url: &'a str) -> Result<FakeRequest<'a>, TransportFault> {
        if let Some(fault) = self.refuse_begin {
            return Err(fault);
        }
        self.begins.set(self.begins.get() + 1);
        Ok(FakeRequest {
            script: self.script,
            releases: &self.releases,
        })
    }
}

impl HttpRequest for FakeRequest<'_> {
    async fn get(&mut self, body: &mut [u8]) -> Result<Response, TransportFault> {
        let (status, bytes) = match self.script {
            Scripted::Body(status, text) => (status, text.as_bytes()),
            Scripted::Bytes(status, bytes) => (status, bytes),
            Scripted::Fault(fault) => return Err(fault),
        };
        let len = bytes.len().min(body.len());
        body[..len].copy_from_slice(&bytes[..len]);
        Ok(Response { status, len })
    }
}

pub struct FakeSession {
    pub connected: bool,
    pub connect_fault: Option<SessionFault>,
    pub publish_fault: Option<SessionFault>,
    /// Returned once by the next pump, dropping the session like a silent broker.
    pub pump_fault: Option<SessionFault>,
    pub connects: u32,
    pub pumps: u32,
    pub published: Vec<(String, String)>,
}

impl FakeSession {
    pub fn connected() -> Self {
        Self {
            connected: true,
            connect_fault: None,
            publish_fault: None,
            pump_fault: None,
            connects: 0,
            pumps: 0,
            published: Vec::new(),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::connected()
        }
    }
}

impl Session for FakeSession {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), SessionFault> {
        self.connects += 1;
        match self.connect_fault {
            Some(fault) => Err(fault),
            None => {
                self.connected = true;
                Ok(())
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionFault> {
        if let Some(fault) = self.publish_fault {
            return Err(fault);
        }
        self.published.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    async fn pump(&mut self) -> Result<(), SessionFault> {
        self.pumps += 1;
        match self.pump_fault.take() {
            Some(fault) => {
                self.connected = false;
                Err(fault)
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeRadio {
    pub frames: Vec<(PeerAddress, Vec<u8>)>,
    pub refuse: Option<RadioFault>,
    pub reports: VecDeque<DeliveryReport>,
}

impl PeerRadio for FakeRadio {
    fn send(&mut self, peer: &PeerAddress, frame: &[u8]) -> Result<(), RadioFault> {
        if let Some(fault) = self.refuse {
            return Err(fault);
        }
        self.frames.push((*peer, frame.to_vec()));
        Ok(())
    }

    fn poll_report(&mut self) -> Option<DeliveryReport> {
        self.reports.pop_front()
    }
}
