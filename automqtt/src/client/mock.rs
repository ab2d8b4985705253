use bytes::Bytes;
use parking_lot::Mutex;
use rmqtt_codec::types::QoS;

use super::Client;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
    pub qos: QoS,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap()
    }
}

/// Records everything handlers send.
#[derive(Default)]
pub struct RecordingClient {
    published: Mutex<Vec<Published>>,
    subscribed: Mutex<Vec<(String, QoS)>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    pub fn last(&self) -> Option<Published> {
        self.published.lock().last().cloned()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

impl Client for RecordingClient {
    fn publish(&self, topic: &str, payload: Bytes, retain: bool, qos: QoS) -> Result<()> {
        self.published.lock().push(Published { topic: topic.to_owned(), payload, retain, qos });
        Ok(())
    }

    fn subscribe(&self, topic_filter: &str, qos: QoS) -> Result<()> {
        self.subscribed.lock().push((topic_filter.to_owned(), qos));
        Ok(())
    }
}
