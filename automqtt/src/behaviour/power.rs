use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rmqtt_codec::types::QoS;

use super::publish_to;
use crate::client::Client;
use crate::fs::VirtualPath;
use crate::handler::{Handler, Message};
use crate::Result;

/// Combined power state of a group of devices.
///
/// The group is `ON` only while every member reports `ON`; the combined state
/// is published retained to `stat/<group>/POWER` after each update.
pub struct PowerStatus {
    topic: String,
    state: Mutex<HashMap<String, bool, ahash::RandomState>>,
}

impl PowerStatus {
    pub fn new<I, S>(group: &str, devices: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = devices.into_iter().map(|d| (d.into(), false)).collect();
        Arc::new(Self { topic: format!("stat/{}/POWER", group), state: Mutex::new(state) })
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn invoke(&self, client: &dyn Client, fs: &VirtualPath, device: &str, payload: &[u8]) -> Result<()> {
        let all_on = {
            let mut state = self.state.lock();
            state.insert(device.to_owned(), payload == b"ON");
            state.values().all(|on| *on)
        };
        let payload = if all_on { "ON" } else { "OFF" };
        publish_to(client, &fs.join(&self.topic), payload, true, QoS::AtLeastOnce)
    }

    /// Handler feeding the state of `device` into this group.
    #[inline]
    pub fn handler<S: Into<String>>(self: &Arc<Self>, device: S) -> Arc<PowerHandler> {
        Arc::new(PowerHandler { status: self.clone(), device: device.into() })
    }
}

pub struct PowerHandler {
    status: Arc<PowerStatus>,
    device: String,
}

impl Handler for PowerHandler {
    #[inline]
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()> {
        self.status.invoke(client, fs, &self.device, &msg.payload)
    }

    fn name(&self) -> &'static str {
        "power"
    }
}
