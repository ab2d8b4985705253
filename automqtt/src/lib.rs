#![deny(unsafe_code)]

//! Routes MQTT messages to handlers through a virtual, read-only filesystem
//! built over a static routing table.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use automqtt::behaviour::{self, PowerStatus};
//! use automqtt::client::Connection;
//! use automqtt::dispatcher::Dispatcher;
//! use automqtt::fs::RoutingTree;
//! use automqtt::tree;
//!
//! #[tokio::main]
//! async fn main() {
//!     let power = PowerStatus::new("lights", ["lamp"]);
//!     let tree = RoutingTree::new(tree!({
//!         "stat" => {
//!             "lamp" => { "POWER" => { "lights" => (power.handler("lamp")) } },
//!             "lights" => { "POWER" => {} },
//!         },
//!     }));
//!     let dispatcher = Arc::new(Dispatcher::new(tree));
//!     Connection::new(Default::default(), dispatcher).run().await;
//! }
//! ```

pub mod behaviour; // Handlers and aggregation state
pub mod client; // Transport contract and MQTT 3.1.1 connection
pub mod dispatcher; // Message to handler routing
pub mod error;
pub mod fs; // Virtual filesystem over the routing table
pub mod handler;
pub mod logger;

pub use automqtt_conf as conf;
pub use automqtt_utils as utils;
pub use rmqtt_codec as codec;

pub use error::MqttError;
pub use handler::{Handler, Message};

pub type Result<T, E = MqttError> = std::result::Result<T, E>;
