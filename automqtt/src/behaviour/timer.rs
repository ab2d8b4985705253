use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;
use rmqtt_codec::types::QoS;

use super::{parse_int, publish_to};
use crate::client::Client;
use crate::fs::VirtualPath;
use crate::handler::{Handler, Message};
use crate::Result;

/// Published while the members of the group disagree.
pub const DISAGREE: &str = "-";

/// Tracks whether every device of a group reports the same timer hour.
pub struct TimerStatus {
    topic: String,
    state: Mutex<HashMap<String, i64, ahash::RandomState>>,
}

impl TimerStatus {
    /// Members start with distinct values so the group is in disagreement
    /// until each of them has reported.
    pub fn new<I, S>(group: &str, index: u8, devices: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = devices.into_iter().enumerate().map(|(i, d)| (d.into(), (i % 24) as i64)).collect();
        Arc::new(Self { topic: format!("stat/{}/TIMER{}/unmarshalled", group, index), state: Mutex::new(state) })
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn invoke(&self, client: &dyn Client, fs: &VirtualPath, device: &str, payload: &[u8]) -> Result<()> {
        let hours = parse_int(payload)?;
        let agreed = {
            let mut state = self.state.lock();
            state.insert(device.to_owned(), hours);
            state.values().all_equal()
        };
        let payload = if agreed { hours.to_string() } else { DISAGREE.to_owned() };
        publish_to(client, &fs.join(&self.topic), payload, true, QoS::AtLeastOnce)
    }

    #[inline]
    pub fn handler<S: Into<String>>(self: &Arc<Self>, device: S) -> Arc<TimerHandler> {
        Arc::new(TimerHandler { status: self.clone(), device: device.into() })
    }
}

pub struct TimerHandler {
    status: Arc<TimerStatus>,
    device: String,
}

impl Handler for TimerHandler {
    #[inline]
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()> {
        self.status.invoke(client, fs, &self.device, &msg.payload)
    }

    fn name(&self) -> &'static str {
        "timer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingClient;
    use crate::fs::RoutingTree;
    use crate::{tree, MqttError};

    fn fs() -> VirtualPath {
        RoutingTree::new(tree!({ "stat" => { "g" => { "TIMER1" => { "unmarshalled" => {} } } } })).root_path()
    }

    #[test]
    fn test_agreement() {
        let fs = fs();
        let client = RecordingClient::new();
        let timer = TimerStatus::new("g", 1, ["a", "b"]);
        assert_eq!(timer.topic(), "stat/g/TIMER1/unmarshalled");

        timer.invoke(&client, &fs, "a", b"5").unwrap();
        assert_eq!(client.last().unwrap().payload_str(), DISAGREE);
        timer.invoke(&client, &fs, "b", b"5").unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "5");
        timer.invoke(&client, &fs, "b", b"6").unwrap();
        assert_eq!(client.last().unwrap().payload_str(), DISAGREE);

        let last = client.last().unwrap();
        assert_eq!(last.topic, "stat/g/TIMER1/unmarshalled");
        assert!(last.retain);
    }

    #[test]
    fn test_seeded_apart() {
        let fs = fs();
        let client = RecordingClient::new();
        //a single report can never agree with the seeds of the others
        let timer = TimerStatus::new("g", 1, ["a", "b", "c"]);
        timer.invoke(&client, &fs, "c", b"0").unwrap();
        assert_eq!(client.last().unwrap().payload_str(), DISAGREE);
    }

    #[test]
    fn test_bad_payload() {
        let fs = fs();
        let client = RecordingClient::new();
        let timer = TimerStatus::new("g", 1, ["a", "b"]);
        timer.invoke(&client, &fs, "a", b"1").unwrap();
        let err = timer.handler("b").handle(&client, &fs, &Message::new("stat/b/TIMER1/unmarshalled", "x"));
        assert!(matches!(err, Err(MqttError::PayloadDecode { .. })));
        assert_eq!(client.published().len(), 1);

        //state of b left unchanged: it still holds its seed
        timer.invoke(&client, &fs, "a", b"1").unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "1");
    }
}
