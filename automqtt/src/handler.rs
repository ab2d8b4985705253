use std::fmt;

use bytes::Bytes;
use bytestring::ByteString;
use rmqtt_codec::types::QoS;

use crate::client::Client;
use crate::fs::VirtualPath;
use crate::Result;

/// An inbound application message as seen by handlers.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: ByteString,
    pub payload: Bytes,
    pub retain: bool,
    pub qos: QoS,
}

impl Message {
    #[inline]
    pub fn new<T: Into<ByteString>, P: Into<Bytes>>(topic: T, payload: P) -> Self {
        Self { topic: topic.into(), payload: payload.into(), retain: false, qos: QoS::AtMostOnce }
    }

    /// Payload as text, invalid UTF-8 is replaced.
    #[inline]
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ topic: {:?}, payload: {:?}, retain: {}, qos: {:?} }}",
            self.topic,
            self.payload_str(),
            self.retain,
            self.qos
        )
    }
}

/// Routing tree leaf.
///
/// `fs` is the root of the routing tree the handler is mounted in; handlers
/// address the topics they publish to through it.
pub trait Handler: Send + Sync {
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()>;

    fn name(&self) -> &'static str;
}
