use bytes::Bytes;
use bytestring::ByteString;
use rmqtt_codec::types::QoS;
use tokio::sync::mpsc;

use crate::{MqttError, Result};

pub use conn::{Connection, Io, Transport};

mod conn;
#[cfg(test)]
pub(crate) mod mock;

/// What handlers may ask the transport to do.
///
/// Calls never block: implementations queue the request and the transport
/// sends it when it gets to it.
pub trait Client: Send + Sync {
    fn publish(&self, topic: &str, payload: Bytes, retain: bool, qos: QoS) -> Result<()>;

    fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Publish { topic: ByteString, payload: Bytes, retain: bool, qos: QoS },
    Subscribe { topic_filter: ByteString, qos: QoS },
}

pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Sending half of the transport's command queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Command>,
}

impl Outbox {
    #[inline]
    pub fn channel() -> (Outbox, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, rx)
    }

    #[inline]
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| MqttError::Disconnected)
    }
}

impl Client for Outbox {
    #[inline]
    fn publish(&self, topic: &str, payload: Bytes, retain: bool, qos: QoS) -> Result<()> {
        log::debug!("publish {} {:?} (retain: {}, qos: {:?})", topic, payload, retain, qos);
        self.send(Command::Publish { topic: ByteString::from(topic), payload, retain, qos })
    }

    #[inline]
    fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<()> {
        self.send(Command::Subscribe { topic_filter: ByteString::from(topic_filter), qos })
    }
}
