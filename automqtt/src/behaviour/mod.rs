//! Handlers mounted in the routing tree.
//!
//! Every publish goes through [`publish_to`], which refuses targets that are
//! missing from the tree or that are handlers.

use std::sync::Arc;

use bytes::Bytes;
use rmqtt_codec::types::QoS;

use crate::client::Client;
use crate::fs::VirtualPath;
use crate::handler::{Handler, Message};
use crate::Result;

pub use power::{PowerHandler, PowerStatus};
pub use retain::{retain, Retain};
pub use time::{time_marshalled, time_unmarshalled, TimeMarshal, TimeUnmarshal};
pub use timer::{TimerHandler, TimerStatus};

mod power;
mod retain;
mod time;
mod timer;

/// Publishes to `target` if it is a topic of the routing tree.
pub fn publish_to<P: Into<Bytes>>(
    client: &dyn Client,
    target: &VirtualPath,
    payload: P,
    retain: bool,
    qos: QoS,
) -> Result<()> {
    target.check_topic()?;
    client.publish(&target.resolve().to_string(), payload.into(), retain, qos)
}

/// Payload parsed as a decimal integer, surrounding whitespace allowed.
pub(crate) fn parse_int(payload: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(payload).map_err(|e| crate::MqttError::payload_decode(payload, e))?;
    text.trim().parse::<i64>().map_err(|e| crate::MqttError::payload_decode(payload, e))
}

pub struct Debug;

impl Handler for Debug {
    fn handle(&self, _client: &dyn Client, _fs: &VirtualPath, msg: &Message) -> Result<()> {
        log::info!("{}: {:?}", msg.topic, msg.payload_str());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "debug"
    }
}

#[inline]
pub fn debug() -> Arc<Debug> {
    Arc::new(Debug)
}

pub struct Noop;

impl Handler for Noop {
    fn handle(&self, _client: &dyn Client, _fs: &VirtualPath, _msg: &Message) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[inline]
pub fn noop() -> Arc<Noop> {
    Arc::new(Noop)
}
