use std::sync::Arc;

use rmqtt_codec::types::QoS;

use super::{parse_int, publish_to};
use crate::client::Client;
use crate::fs::VirtualPath;
use crate::handler::{Handler, Message};
use crate::{MqttError, Result};

pub const DEFAULT_COMMAND_PREFIX: &str = "cmnd";

/// Turns a slider position into a Tasmota timer command.
///
/// A message on `<anchor>/<device>/Timer1` carrying `p` publishes
/// `{"Time" : "<p - 1>:59"}` (hours modulo 24) to `<prefix>/<device>/Timer1`.
pub struct TimeMarshal {
    prefix: String,
}

impl TimeMarshal {
    #[inline]
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Handler for TimeMarshal {
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()> {
        let target_time = parse_int(&msg.payload)?;
        let hours = (target_time.rem_euclid(24) + 23) % 24;
        let target = fs.join(&self.prefix).join(fs.join(&*msg.topic).strip_anchor());
        publish_to(client, &target, format!("{{\"Time\" : \"{}:59\"}}", hours), false, QoS::AtLeastOnce)
    }

    fn name(&self) -> &'static str {
        "time-marshalled"
    }
}

#[inline]
pub fn time_marshalled() -> Arc<TimeMarshal> {
    Arc::new(TimeMarshal::new(DEFAULT_COMMAND_PREFIX))
}

/// Reads `Timer<index>.Time` (`H:M`) from a Tasmota timer report and publishes
/// the nearest hour to `stat/<device>/TIMER<index>/unmarshalled`.
pub struct TimeUnmarshal {
    timer_name: String,
    topic: String,
}

impl TimeUnmarshal {
    pub fn new(index: u8, device: &str) -> Self {
        Self {
            timer_name: format!("Timer{}", index),
            topic: format!("stat/{}/TIMER{}/unmarshalled", device, index),
        }
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn hours(&self, payload: &[u8]) -> Result<i64> {
        let doc: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| MqttError::payload_decode(payload, e))?;
        let time = doc
            .get(&self.timer_name)
            .and_then(|timer| timer.get("Time"))
            .ok_or_else(|| MqttError::missing_field(payload, format!("{}.Time", self.timer_name)))?;
        let time = time.as_str().ok_or_else(|| MqttError::payload_decode(payload, "Time is not a string"))?;

        let mut parts = time.split(':');
        let (Some(hours), Some(minutes)) = (parts.next(), parts.next()) else {
            return Err(MqttError::payload_decode(payload, format!("expected H:M, found {:?}", time)));
        };
        let hours: i64 = hours.trim().parse().map_err(|e| MqttError::payload_decode(payload, e))?;
        let minutes: i64 = minutes.trim().parse().map_err(|e| MqttError::payload_decode(payload, e))?;
        if minutes >= 30 {
            Ok((hours.rem_euclid(24) + 1) % 24)
        } else {
            Ok(hours)
        }
    }
}

impl Handler for TimeUnmarshal {
    fn handle(&self, client: &dyn Client, fs: &VirtualPath, msg: &Message) -> Result<()> {
        let hours = self.hours(&msg.payload)?;
        publish_to(client, &fs.join(&self.topic), hours.to_string(), true, QoS::AtLeastOnce)
    }

    fn name(&self) -> &'static str {
        "time-unmarshalled"
    }
}

#[inline]
pub fn time_unmarshalled(index: u8, device: &str) -> Arc<TimeUnmarshal> {
    Arc::new(TimeUnmarshal::new(index, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingClient;
    use crate::fs::RoutingTree;
    use crate::tree;

    fn fs() -> VirtualPath {
        RoutingTree::new(tree!({
            "stat" => { "plug" => { "TIMER1" => { "unmarshalled" => {} } } },
            "cmnd" => { "plug" => { "Timer1" => {} } },
            "cmnde" => { "plug" => { "Timer1" => { "marshalling" => (time_marshalled()) } } },
        }))
        .root_path()
    }

    #[test]
    fn test_marshal() {
        let fs = fs();
        let client = RecordingClient::new();
        let marshal = time_marshalled();
        marshal.handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "8")).unwrap();
        let p = client.last().unwrap();
        assert_eq!(p.topic, "cmnd/plug/Timer1");
        assert_eq!(p.payload_str(), r#"{"Time" : "7:59"}"#);
        assert!(!p.retain);
        assert_eq!(p.qos, QoS::AtLeastOnce);

        marshal.handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "0")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), r#"{"Time" : "23:59"}"#);

        let err = marshal.handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "eight"));
        assert!(matches!(err, Err(MqttError::PayloadDecode { .. })));

        let err = TimeMarshal::new("cmd").handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "8"));
        assert!(matches!(err, Err(MqttError::NotFound(_))));
    }

    #[test]
    fn test_unmarshal() {
        let fs = fs();
        let client = RecordingClient::new();
        let unmarshal = time_unmarshalled(1, "plug");
        assert_eq!(unmarshal.topic(), "stat/plug/TIMER1/unmarshalled");

        let report = |time: &str| Message::new("stat/plug/TIMER", format!(r#"{{"Timer1":{{"Time":"{}"}}}}"#, time));
        unmarshal.handle(&client, &fs, &report("7:35")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "8");
        unmarshal.handle(&client, &fs, &report("7:29")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "7");
        unmarshal.handle(&client, &fs, &report("23:45")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "0");

        let p = client.last().unwrap();
        assert_eq!(p.topic, "stat/plug/TIMER1/unmarshalled");
        assert!(p.retain);
    }

    #[test]
    fn test_extreme_values_wrap() {
        let fs = fs();
        let client = RecordingClient::new();

        time_marshalled().handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "-9223372036854775808")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), r#"{"Time" : "15:59"}"#);
        time_marshalled().handle(&client, &fs, &Message::new("cmnde/plug/Timer1", "-1")).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), r#"{"Time" : "22:59"}"#);

        let unmarshal = time_unmarshalled(1, "plug");
        let report = Message::new("stat/plug/TIMER", r#"{"Timer1":{"Time":"9223372036854775807:45"}}"#);
        unmarshal.handle(&client, &fs, &report).unwrap();
        assert_eq!(client.last().unwrap().payload_str(), "8");
    }

    #[test]
    fn test_unmarshal_errors() {
        let fs = fs();
        let client = RecordingClient::new();
        let unmarshal = time_unmarshalled(1, "plug");
        let handle = |payload: &'static str| unmarshal.handle(&client, &fs, &Message::new("stat/plug/TIMER", payload));

        assert!(matches!(handle(r#"{"Timer2":{"Time":"7:35"}}"#), Err(MqttError::MissingField { .. })));
        assert!(matches!(handle(r#"{"Timer1":{}}"#), Err(MqttError::MissingField { .. })));
        assert!(matches!(handle("{not json"), Err(MqttError::PayloadDecode { .. })));
        assert!(matches!(handle(r#"{"Timer1":{"Time":"7"}}"#), Err(MqttError::PayloadDecode { .. })));
        assert!(matches!(handle(r#"{"Timer1":{"Time":"x:30"}}"#), Err(MqttError::PayloadDecode { .. })));
        assert!(client.published().is_empty());

        let report = Message::new("t", r#"{"Timer1":{"Time":"7:35"}}"#);
        let err = time_unmarshalled(1, "other").handle(&client, &fs, &report);
        assert!(matches!(err, Err(MqttError::NotFound(_))));
    }
}
