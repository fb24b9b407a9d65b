use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{State, TcpSocket};
use embassy_net::Stack;
use embassy_time::{with_timeout, Duration, Instant};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

use crate::fmt::{debug, info};
use crate::publish::{client_state, Session, SessionFault};

const PACKET_BUFFER: usize = 512;
const SOCKET_BUFFER: usize = 1024;
const KEEP_ALIVE_SECS: u16 = 15;
const PING_EVERY: Duration = Duration::from_secs(10);
/// DNS, TCP and CONNACK together.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// One publish or ping round trip.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(3);
/// A silent broker is given one and a half keep-alive periods.
const IDLE_TIMEOUT: Duration = Duration::from_secs(KEEP_ALIVE_SECS as u64 * 3 / 2);

pub struct SocketBuffers {
    rx: [u8; SOCKET_BUFFER],
    tx: [u8; SOCKET_BUFFER],
}

impl SocketBuffers {
    pub const fn new() -> Self {
        Self {
            rx: [0; SOCKET_BUFFER],
            tx: [0; SOCKET_BUFFER],
        }
    }
}

#[derive(Clone, Copy)]
pub struct Broker {
    pub host: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    /// Empty means anonymous.
    pub user: &'static str,
    pub password: &'static str,
}

fn fault(code: ReasonCode) -> SessionFault {
    let value = match code {
        ReasonCode::NotAuthorized => client_state::UNAUTHORIZED,
        ReasonCode::BadUserNameOrPassword => client_state::BAD_CREDENTIALS,
        ReasonCode::ClientIdNotValid => client_state::BAD_CLIENT_ID,
        ReasonCode::ServerUnavailable | ReasonCode::ServerBusy => client_state::UNAVAILABLE,
        ReasonCode::UnsupportedProtocolVersion => client_state::BAD_PROTOCOL,
        ReasonCode::NetworkError => client_state::CONNECTION_LOST,
        _ => client_state::CONNECT_FAILED,
    };
    SessionFault::from_state(value).unwrap_or(SessionFault::ConnectFailed)
}

fn client<'a>(
    socket: &'a mut TcpSocket<'static>,
    write: &'a mut [u8; PACKET_BUFFER],
    recv: &'a mut [u8; PACKET_BUFFER],
    broker: &Broker,
) -> MqttClient<'a, &'a mut TcpSocket<'static>, 5, CountingRng> {
    let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20_000));
    config.add_client_id(broker.client_id);
    if !broker.user.is_empty() {
        config.add_username(broker.user);
        config.add_password(broker.password);
    }
    config.keep_alive = KEEP_ALIVE_SECS;
    config.max_packet_size = PACKET_BUFFER as u32;

    MqttClient::<_, 5, _>::new(socket, write, PACKET_BUFFER, recv, PACKET_BUFFER, config)
}

/// MQTT v5 session over one long-lived TCP socket.
pub struct MqttSession {
    stack: Stack<'static>,
    socket: TcpSocket<'static>,
    broker: Broker,
    write: [u8; PACKET_BUFFER],
    recv: [u8; PACKET_BUFFER],
    connected: bool,
    last_ping: Instant,
}

impl MqttSession {
    pub fn new(stack: Stack<'static>, buffers: &'static mut SocketBuffers, broker: Broker) -> Self {
        let SocketBuffers { rx, tx } = buffers;
        Self {
            stack,
            socket: TcpSocket::new(stack, rx, tx),
            broker,
            write: [0; PACKET_BUFFER],
            recv: [0; PACKET_BUFFER],
            connected: false,
            last_ping: Instant::now(),
        }
    }

    async fn open(&mut self) -> Result<(), SessionFault> {
        // Whatever was left of the last connection
        self.socket.abort();

        let address = self
            .stack
            .dns_query(self.broker.host, DnsQueryType::A)
            .await
            .map_err(|_| SessionFault::ConnectFailed)?
            .first()
            .copied()
            .ok_or(SessionFault::ConnectFailed)?;

        self.socket
            .connect((address, self.broker.port))
            .await
            .map_err(|_| SessionFault::ConnectFailed)?;
        debug!("tcp connected to {}:{}", self.broker.host, self.broker.port);

        client(&mut self.socket, &mut self.write, &mut self.recv, &self.broker)
            .connect_to_broker()
            .await
            .map_err(fault)
    }

    fn drop_session(&mut self, fault: SessionFault) -> SessionFault {
        self.connected = false;
        self.socket.abort();
        fault
    }
}

impl Session for MqttSession {
    fn is_connected(&self) -> bool {
        self.connected && self.socket.state() == State::Established
    }

    async fn connect(&mut self) -> Result<(), SessionFault> {
        self.connected = false;
        self.socket.set_timeout(Some(CONNECT_TIMEOUT));

        match with_timeout(CONNECT_TIMEOUT, self.open()).await {
            Ok(Ok(())) => {
                info!("mqtt session up as '{}'", self.broker.client_id);
                self.socket.set_timeout(Some(IDLE_TIMEOUT));
                self.connected = true;
                self.last_ping = Instant::now();
                Ok(())
            }
            Ok(Err(fault)) => Err(self.drop_session(fault)),
            Err(_) => Err(self.drop_session(SessionFault::ConnectionTimeout)),
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionFault> {
        if !self.is_connected() {
            return Err(SessionFault::Disconnected);
        }
        let sent = with_timeout(
            EXCHANGE_TIMEOUT,
            client(&mut self.socket, &mut self.write, &mut self.recv, &self.broker).send_message(
                topic,
                payload,
                QualityOfService::QoS0,
                false,
            ),
        )
        .await;

        match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ReasonCode::NetworkError)) => Err(self.drop_session(SessionFault::ConnectionLost)),
            Ok(Err(code)) => Err(fault(code)),
            Err(_) => Err(self.drop_session(SessionFault::ConnectionTimeout)),
        }
    }

    async fn pump(&mut self) -> Result<(), SessionFault> {
        if !self.connected {
            return Ok(());
        }
        if self.socket.state() != State::Established {
            return Err(self.drop_session(SessionFault::ConnectionLost));
        }
        if self.last_ping.elapsed() < PING_EVERY {
            return Ok(());
        }

        let pinged = with_timeout(
            EXCHANGE_TIMEOUT,
            client(&mut self.socket, &mut self.write, &mut self.recv, &self.broker).send_ping(),
        )
        .await;
        match pinged {
            Ok(Ok(())) => {
                self.last_ping = Instant::now();
                Ok(())
            }
            Ok(Err(_)) => Err(self.drop_session(SessionFault::ConnectionLost)),
            Err(_) => Err(self.drop_session(SessionFault::ConnectionTimeout)),
        }
    }
}
