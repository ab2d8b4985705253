use std::str::Utf8Error;
use std::time::Duration;

use rmqtt_codec::error::{DecodeError, EncodeError};
use thiserror::Error;

use crate::fs::VirtualPath;

#[derive(Error, Debug)]
pub enum MqttError {
    /// The path has no node in the routing tree.
    #[error("no such topic or handler, \"{0}\"")]
    NotFound(VirtualPath),
    /// A handler (leaf) was used where a topic (directory) is required.
    #[error("not a topic, \"{0}\" is a handler")]
    NotADirectory(VirtualPath),
    /// A topic (directory) was used where a handler (leaf) is required.
    #[error("not a handler, \"{0}\" is a topic")]
    IsADirectory(VirtualPath),
    #[error("cannot decode payload {payload:?}, {reason}")]
    PayloadDecode { payload: String, reason: String },
    #[error("missing key {key:?} in {payload:?}")]
    MissingField { key: String, payload: String },
    #[error("connection refused, {0}")]
    ConnectRefused(String),
    #[error("read/write timeout")]
    Timeout(Duration),
    #[error("connection closed by peer")]
    Disconnected,
    #[error("encode error, {0}")]
    EncodeError(EncodeError),
    #[error("decode error, {0}")]
    DecodeError(DecodeError),
    #[error("{0}")]
    IoError(std::io::Error),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Json(serde_json::Error),
    #[error("utf8 error, {0}")]
    Utf8Error(Utf8Error),
}

impl MqttError {
    #[inline]
    pub(crate) fn payload_decode<R: ToString>(payload: &[u8], reason: R) -> Self {
        MqttError::PayloadDecode { payload: String::from_utf8_lossy(payload).into_owned(), reason: reason.to_string() }
    }

    #[inline]
    pub(crate) fn missing_field<K: Into<String>>(payload: &[u8], key: K) -> Self {
        MqttError::MissingField { key: key.into(), payload: String::from_utf8_lossy(payload).into_owned() }
    }

    /// The path a classification error refers to.
    #[inline]
    pub fn path(&self) -> Option<&VirtualPath> {
        match self {
            MqttError::NotFound(p) | MqttError::NotADirectory(p) | MqttError::IsADirectory(p) => Some(p),
            _ => None,
        }
    }
}

impl From<String> for MqttError {
    #[inline]
    fn from(e: String) -> Self {
        MqttError::Msg(e)
    }
}

impl From<&str> for MqttError {
    #[inline]
    fn from(e: &str) -> Self {
        MqttError::Msg(e.to_string())
    }
}

impl From<Utf8Error> for MqttError {
    #[inline]
    fn from(e: Utf8Error) -> Self {
        MqttError::Utf8Error(e)
    }
}

impl From<anyhow::Error> for MqttError {
    #[inline]
    fn from(e: anyhow::Error) -> Self {
        MqttError::Anyhow(e)
    }
}

impl From<serde_json::Error> for MqttError {
    #[inline]
    fn from(e: serde_json::Error) -> Self {
        MqttError::Json(e)
    }
}

impl From<std::io::Error> for MqttError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        MqttError::IoError(e)
    }
}

impl From<EncodeError> for MqttError {
    #[inline]
    fn from(e: EncodeError) -> Self {
        MqttError::EncodeError(e)
    }
}

impl From<DecodeError> for MqttError {
    #[inline]
    fn from(e: DecodeError) -> Self {
        MqttError::DecodeError(e)
    }
}
