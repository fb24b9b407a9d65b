use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState, TcpConnection};
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration};
use reqwless::client::{HttpClient as Client, HttpRequestHandle};
use reqwless::request::{Method, RequestBuilder};
use reqwless::Error;

use crate::poll::{code, HttpClient, HttpRequest, Response, TransportFault};

const SOCKET_BUFFER: usize = 1024;
/// Headers plus body of a single response.
const RX_BUFFER: usize = 2048;
/// DNS lookup plus TCP connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub type TcpState = TcpClientState<1, SOCKET_BUFFER, SOCKET_BUFFER>;
pub type HttpTcp = TcpClient<'static, 1, SOCKET_BUFFER, SOCKET_BUFFER>;
type Connection<'a> = TcpConnection<'a, 1, SOCKET_BUFFER, SOCKET_BUFFER>;

/// Plain-HTTP client over the embassy-net stack, one connection at a time.
pub struct ReqwlessHttp {
    client: Client<'static, HttpTcp, DnsSocket<'static>>,
    rx: [u8; RX_BUFFER],
}

impl ReqwlessHttp {
    pub fn new(tcp: &'static HttpTcp, dns: &'static DnsSocket<'static>) -> Self {
        Self {
            client: Client::new(tcp, dns),
            rx: [0; RX_BUFFER],
        }
    }

    pub fn tcp(stack: Stack<'static>, state: &'static TcpState) -> HttpTcp {
        TcpClient::new(stack, state)
    }
}

/// Dropping it closes the socket and hands it back to the client pool.
pub struct ReqwlessRequest<'a> {
    handle: HttpRequestHandle<'a, Connection<'a>, ()>,
    rx: &'a mut [u8],
}

fn open_fault(e: Error) -> TransportFault {
    match e {
        Error::InvalidUrl(_) => TransportFault::InvalidEndpoint,
        Error::Dns | Error::Network(_) => TransportFault::from_code(code::NOT_CONNECTED),
        _ => TransportFault::from_code(code::CONNECTION_REFUSED),
    }
}

fn exchange_fault(e: Error) -> TransportFault {
    let value = match e {
        Error::Network(_) | Error::ConnectionAborted => code::SEND_HEADER_FAILED,
        // Not HTTP on the other end
        Error::Codec => code::NO_HTTP_SERVER,
        Error::BufferTooSmall => code::TOO_LESS_RAM,
        _ => code::SEND_PAYLOAD_FAILED,
    };
    TransportFault::from_code(value)
}

impl HttpClient for ReqwlessHttp {
    type Request<'a> = ReqwlessRequest<'a>;

    async fn begin<'a>(&'a mut self, url: &'a str) -> Result<ReqwlessRequest<'a>, TransportFault> {
        let handle = with_timeout(CONNECT_TIMEOUT, self.client.request(Method::GET, url))
            .await
            .map_err(|_| TransportFault::from_code(code::NOT_CONNECTED))?
            .map_err(open_fault)?;
        Ok(ReqwlessRequest {
            handle: handle.headers(&[("Connection", "close")]),
            rx: &mut self.rx,
        })
    }
}

impl HttpRequest for ReqwlessRequest<'_> {
    async fn get(&mut self, body: &mut [u8]) -> Result<Response, TransportFault> {
        let response = with_timeout(READ_TIMEOUT, self.handle.send(self.rx))
            .await
            .map_err(|_| TransportFault::from_code(code::READ_TIMEOUT))?
            .map_err(exchange_fault)?;
        let status = response.status.0;

        let content = with_timeout(READ_TIMEOUT, response.body().read_to_end())
            .await
            .map_err(|_| TransportFault::from_code(code::READ_TIMEOUT))?
            .map_err(exchange_fault)?;

        let len = content.len().min(body.len());
        body[..len].copy_from_slice(&content[..len]);
        Ok(Response { status, len })
    }
}
