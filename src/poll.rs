//! One HTTP poll cycle: link check, GET, body hand-off.

use core::fmt;

use crate::fmt::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkFault {
    /// The access point did not answer within the attempt window.
    Timeout,
    /// Association or DHCP was refused by the driver.
    Rejected,
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFault::Timeout => f.write_str("association timed out"),
            LinkFault::Rejected => f.write_str("association rejected"),
        }
    }
}

/// Network association (Wi-Fi station + IP configuration).
#[allow(async_fn_in_trait)]
pub trait Link {
    fn is_up(&self) -> bool;

    /// One association attempt.
    async fn associate(&mut self) -> Result<(), LinkFault>;
}

/// Negative result codes of the classic embedded HTTP client.
pub mod code {
    pub const CONNECTION_REFUSED: i32 = -1;
    pub const SEND_HEADER_FAILED: i32 = -2;
    pub const SEND_PAYLOAD_FAILED: i32 = -3;
    pub const NOT_CONNECTED: i32 = -4;
    pub const CONNECTION_LOST: i32 = -5;
    pub const NO_STREAM: i32 = -6;
    pub const NO_HTTP_SERVER: i32 = -7;
    pub const TOO_LESS_RAM: i32 = -8;
    pub const ENCODING: i32 = -9;
    pub const STREAM_WRITE: i32 = -10;
    pub const READ_TIMEOUT: i32 = -11;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportFault {
    ConnectionRefused,
    SendHeaderFailed,
    ConnectFailed,
    ReadTimeout,
    /// The URL could not be turned into a request.
    InvalidEndpoint,
    /// Any other client code, kept for diagnostics.
    Other(i32),
}

impl TransportFault {
    pub fn from_code(value: i32) -> Self {
        match value {
            code::CONNECTION_REFUSED => TransportFault::ConnectionRefused,
            code::SEND_HEADER_FAILED => TransportFault::SendHeaderFailed,
            code::NOT_CONNECTED => TransportFault::ConnectFailed,
            code::READ_TIMEOUT => TransportFault::ReadTimeout,
            other => TransportFault::Other(other),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFault::ConnectionRefused => f.write_str("connection refused"),
            TransportFault::SendHeaderFailed => f.write_str("send header failed"),
            TransportFault::ConnectFailed => f.write_str("connect failed"),
            TransportFault::ReadTimeout => f.write_str("read timeout"),
            TransportFault::InvalidEndpoint => f.write_str("invalid endpoint"),
            TransportFault::Other(code) => write!(f, "transport error {}", code),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Bytes of body written into the caller's buffer.
    pub len: usize,
}

/// Opens requests. The returned request owns the connection and releases it
/// when dropped, whichever way the caller leaves.
#[allow(async_fn_in_trait)]
pub trait HttpClient {
    type Request<'a>: HttpRequest
    where
        Self: 'a;

    async fn begin<'a>(&'a mut self, url: &'a str) -> Result<Self::Request<'a>, TransportFault>;
}

#[allow(async_fn_in_trait)]
pub trait HttpRequest {
    /// Sends GET and copies as much body as fits into `body`.
    async fn get(&mut self, body: &mut [u8]) -> Result<Response, TransportFault>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<'b> {
    Delivered { status: u16, document: &'b str },
    TransportError(TransportFault),
    LinkDown,
}

pub async fn poll<'b, L, H>(link: &L, http: &mut H, endpoint: &str, body: &'b mut [u8]) -> PollOutcome<'b>
where
    L: Link,
    H: HttpClient,
{
    if !link.is_up() {
        return PollOutcome::LinkDown;
    }

    let response = {
        let mut request = match http.begin(endpoint).await {
            Ok(request) => request,
            Err(fault) => {
                warn!("http begin failed: {:?}", fault);
                return PollOutcome::TransportError(fault);
            }
        };

        match request.get(body).await {
            Ok(response) => response,
            Err(fault) => {
                warn!("http GET failed: {:?}", fault);
                return PollOutcome::TransportError(fault);
            }
        }
        // connection released here, before decoding
    };

    if !(200..300).contains(&response.status) {
        warn!("http status {}", response.status);
    }

    let body: &'b [u8] = body;
    let filled = &body[..response.len.min(body.len())];
    let document = match core::str::from_utf8(filled) {
        Ok(text) => text,
        Err(e) => {
            debug!("body not utf-8 past byte {}", e.valid_up_to());
            core::str::from_utf8(&filled[..e.valid_up_to()]).unwrap_or("")
        }
    };

    PollOutcome::Delivered {
        status: response.status,
        document,
    }
}
