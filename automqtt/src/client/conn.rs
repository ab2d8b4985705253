use std::num::NonZeroU16;
use std::sync::Arc;

use bytes::Bytes;
use bytestring::ByteString;
use futures::{SinkExt, StreamExt};
use rmqtt_codec::types::{Publish, QoS};
use rmqtt_codec::v3::{Codec, Connect, ConnectAckReason, Packet, SubscribeReturnCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;

use automqtt_conf::Mqtt;

use super::{Command, CommandReceiver, Outbox};
use crate::dispatcher::Dispatcher;
use crate::handler::Message;
use crate::{MqttError, Result};

pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type Transport<T = Box<dyn Io>> = Framed<T, Codec>;

/// MQTT 3.1.1 client session feeding a [`Dispatcher`].
///
/// The connection owns the receiving half of the handlers' [`Outbox`]. Commands
/// queued while the broker is unreachable, and a command whose write failed,
/// are sent after the next reconnect.
pub struct Connection {
    cfg: Mqtt,
    dispatcher: Arc<Dispatcher>,
    outbox: Outbox,
    commands: CommandReceiver,
    pending: Option<Command>,
    packet_id: NonZeroU16,
}

impl Connection {
    pub fn new(cfg: Mqtt, dispatcher: Arc<Dispatcher>) -> Self {
        let (outbox, commands) = Outbox::channel();
        Self { cfg, dispatcher, outbox, commands, pending: None, packet_id: NonZeroU16::MIN }
    }

    /// Connects, serves, and reconnects after `reconnect_interval` on any failure. Never returns.
    pub async fn run(mut self) {
        let sleep_interval = self.cfg.reconnect_interval;
        loop {
            match self.connect().await {
                Ok(mut transport) => {
                    log::info!("{} Successfully connected to {}", self.cfg.client_id, self.cfg.server);
                    if let Err(e) = self.serve(&mut transport).await {
                        log::warn!("{} Connection to {} lost, {}", self.cfg.client_id, self.cfg.server, e);
                    }
                }
                Err(e) => {
                    log::warn!("{} Connect to {} fail, {}", self.cfg.client_id, self.cfg.server, e);
                }
            }
            time::sleep(sleep_interval).await;
        }
    }

    async fn connect(&mut self) -> Result<Transport> {
        let timeout = self.cfg.connect_timeout;
        let tcp = time::timeout(timeout, TcpStream::connect(self.cfg.server.addr.as_str()))
            .await
            .map_err(|_| MqttError::Timeout(timeout))??;
        tcp.set_nodelay(true)?;

        let io: Box<dyn Io> = if self.cfg.server.is_tls() {
            Box::new(tls::connect(self.cfg.server.host(), tcp).await?)
        } else {
            Box::new(tcp)
        };
        self.handshake(io).await
    }

    /// Sends CONNECT and waits `connect_timeout` for an accepting CONNACK.
    pub async fn handshake<T: Io>(&self, io: T) -> Result<Transport<T>> {
        let mut transport = Framed::new(io, Codec::new(self.cfg.max_packet_size.as_u32()));

        let connect = Connect {
            clean_session: self.cfg.clean_session,
            keep_alive: self.cfg.keepalive.as_secs().min(u16::MAX as u64) as u16,
            client_id: ByteString::from(self.cfg.client_id.as_str()),
            username: self.cfg.username.as_deref().map(ByteString::from),
            password: self.cfg.password.as_ref().map(|p| Bytes::from(p.clone())),
            ..Default::default()
        };
        transport.send(Packet::Connect(Box::new(connect))).await?;

        let timeout = self.cfg.connect_timeout;
        let ack = time::timeout(timeout, transport.next()).await.map_err(|_| MqttError::Timeout(timeout))?;
        match ack {
            Some(Ok((Packet::ConnectAck(ack), _))) if ack.return_code == ConnectAckReason::ConnectionAccepted => {
                Ok(transport)
            }
            Some(Ok((Packet::ConnectAck(ack), _))) => {
                Err(MqttError::ConnectRefused(ack.return_code.reason().into()))
            }
            Some(Ok((packet, _))) => Err(MqttError::from(format!("expected CONNACK, received {:?}", packet))),
            Some(Err(e)) => Err(e.into()),
            None => Err(MqttError::Disconnected),
        }
    }

    /// Subscribes the routing tree, then runs the event loop until the connection fails.
    pub async fn serve<T: Io>(&mut self, transport: &mut Transport<T>) -> Result<()> {
        self.resend_pending(transport).await?;
        let topics = self.dispatcher.on_connect(&self.outbox);
        log::info!("{} subscribing {} topics", self.cfg.client_id, topics.len());

        let keepalive = self.cfg.keepalive;
        let mut ping = time::interval_at(Instant::now() + keepalive, keepalive.max(time::Duration::from_secs(1)));
        loop {
            tokio::select! {
                packet = transport.next() => match packet {
                    Some(Ok((packet, _))) => self.on_packet(transport, packet).await?,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(MqttError::Disconnected),
                },
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(transport, cmd).await?,
                    None => return Ok(()),
                },
                _ = ping.tick(), if !keepalive.is_zero() => {
                    transport.send(Packet::PingRequest).await?;
                }
            }
        }
    }

    async fn on_packet<T: Io>(&mut self, transport: &mut Transport<T>, packet: Packet) -> Result<()> {
        match packet {
            Packet::Publish(publish) => {
                match (publish.qos, publish.packet_id) {
                    (QoS::AtLeastOnce, Some(packet_id)) => transport.send(Packet::PublishAck { packet_id }).await?,
                    (QoS::ExactlyOnce, Some(packet_id)) => {
                        transport.send(Packet::PublishReceived { packet_id }).await?
                    }
                    _ => {}
                }
                let msg = Message {
                    topic: publish.topic,
                    payload: publish.payload,
                    retain: publish.retain,
                    qos: publish.qos,
                };
                self.dispatcher.dispatch(&self.outbox, &msg);
            }
            Packet::PublishRelease { packet_id } => transport.send(Packet::PublishComplete { packet_id }).await?,
            Packet::PublishReceived { packet_id } => transport.send(Packet::PublishRelease { packet_id }).await?,
            Packet::PublishAck { packet_id } | Packet::PublishComplete { packet_id } => {
                log::trace!("{} delivered, packet_id: {}", self.cfg.client_id, packet_id);
            }
            Packet::SubscribeAck { packet_id, status } => {
                if status.iter().any(|s| matches!(s, SubscribeReturnCode::Failure)) {
                    log::warn!(
                        "{} Subscribe failure, packet_id: {}, status: {:?}",
                        self.cfg.client_id,
                        packet_id,
                        status
                    );
                } else {
                    log::debug!("{} Successfully subscribed, packet_id: {}", self.cfg.client_id, packet_id);
                }
            }
            Packet::PingResponse => log::trace!("{} PINGRESP", self.cfg.client_id),
            Packet::Disconnect => return Err(MqttError::Disconnected),
            packet => log::warn!("{} unexpected packet, {:?}", self.cfg.client_id, packet),
        }
        Ok(())
    }

    async fn resend_pending<T: Io>(&mut self, transport: &mut Transport<T>) -> Result<()> {
        match self.pending.take() {
            Some(cmd) => self.on_command(transport, cmd).await,
            None => Ok(()),
        }
    }

    /// Sends `cmd`, keeping it pending when the write fails.
    async fn on_command<T: Io>(&mut self, transport: &mut Transport<T>, cmd: Command) -> Result<()> {
        let packet = match cmd.clone() {
            Command::Publish { topic, payload, retain, qos } => {
                let packet_id = if qos == QoS::AtMostOnce { None } else { Some(self.next_packet_id()) };
                Packet::Publish(Box::new(Publish {
                    dup: false,
                    retain,
                    qos,
                    topic,
                    packet_id,
                    payload,
                    properties: None,
                    delay_interval: None,
                    create_time: None,
                }))
            }
            Command::Subscribe { topic_filter, qos } => {
                Packet::Subscribe { packet_id: self.next_packet_id(), topic_filters: vec![(topic_filter, qos)] }
            }
        };
        if let Err(e) = transport.send(packet).await {
            self.pending = Some(cmd);
            return Err(e.into());
        }
        Ok(())
    }

    #[inline]
    fn next_packet_id(&mut self) -> NonZeroU16 {
        let packet_id = self.packet_id;
        self.packet_id = packet_id.checked_add(1).unwrap_or(NonZeroU16::MIN);
        packet_id
    }
}

#[cfg(feature = "tls")]
mod tls {
    use std::sync::Arc;

    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig, RootCertStore};
    use tokio::net::TcpStream;
    use tokio_rustls::client::TlsStream;
    use tokio_rustls::TlsConnector;

    use crate::{MqttError, Result};

    pub(super) async fn connect(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
        let roots = RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.into() };
        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| MqttError::from(format!("tls config error, {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| MqttError::from(format!("invalid tls server name {:?}, {}", host, e)))?;
        Ok(TlsConnector::from(Arc::new(config)).connect(server_name, tcp).await?)
    }
}

#[cfg(not(feature = "tls"))]
mod tls {
    use tokio::net::TcpStream;

    use crate::{MqttError, Result};

    pub(super) async fn connect(host: &str, _tcp: TcpStream) -> Result<TcpStream> {
        Err(MqttError::from(format!("{}: tls support is not compiled in", host)))
    }
}
