use std::sync::Arc;

use rmqtt_codec::types::QoS;

use super::publish_to;
use crate::client::Client;
use crate::fs::VirtualPath;
use crate::handler::{Handler, Message};
use crate::Result;

/// Republishes every message retained on `<topic>/retained`.
pub struct Retain;

impl Handler for Retain {
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()> {
        let target = fs.join(&*msg.topic).join("retained");
        publish_to(client, &target, msg.payload.clone(), true, QoS::AtLeastOnce)
    }

    fn name(&self) -> &'static str {
        "retain"
    }
}

#[inline]
pub fn retain() -> Arc<Retain> {
    Arc::new(Retain)
}
