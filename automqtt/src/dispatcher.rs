use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rmqtt_codec::types::QoS;

use crate::client::Client;
use crate::fs::{Kind, RoutingTree, VirtualPath};
use crate::handler::Message;
use crate::utils::Counter;
use crate::MqttError;

/// Routes inbound messages to the handlers mounted below their topic.
///
/// A handler mounted at `<topic>/<name>` receives every message published on
/// `<topic>`. Handler failures are logged and never stop delivery to the
/// remaining handlers.
pub struct Dispatcher {
    tree: Arc<RoutingTree>,
    root: VirtualPath,
    stats: Stats,
}

impl Dispatcher {
    pub fn new(tree: Arc<RoutingTree>) -> Self {
        let root = tree.root_path();
        Self { tree, root, stats: Stats::default() }
    }

    #[inline]
    pub fn tree(&self) -> &Arc<RoutingTree> {
        &self.tree
    }

    #[inline]
    pub fn root(&self) -> &VirtualPath {
        &self.root
    }

    #[inline]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Subscribes every topic that has at least one handler below it, returns those topics.
    pub fn on_connect(&self, client: &dyn Client) -> Vec<String> {
        let mut topics = Vec::new();
        for (path, _dirs, leaves) in self.root.walk() {
            if leaves.is_empty() {
                continue;
            }
            if path.anchor().is_none() {
                log::warn!("handlers {:?} mounted at the root can never be reached", leaves);
                continue;
            }
            let topic = path.resolve().to_string();
            match client.subscribe(&topic, QoS::AtMostOnce) {
                Ok(()) => log::info!("Subscribing to {}", topic),
                Err(e) => log::warn!("Subscribe to {} fail, {}", topic, e),
            }
            topics.push(topic);
        }
        topics
    }

    #[inline]
    pub fn on_message<P: Into<Bytes>>(&self, client: &dyn Client, topic: &str, payload: P) -> usize {
        self.dispatch(client, &Message::new(topic, payload))
    }

    /// Invokes the handlers below `msg.topic`, returns how many were invoked.
    pub fn dispatch(&self, client: &dyn Client, msg: &Message) -> usize {
        self.stats.messages.inc();
        let topic = self.root.join(&*msg.topic);
        let children = match topic.children() {
            Ok(children) => children,
            Err(e) => {
                self.stats.unrouted.inc();
                log::warn!("message on unrouted topic {:?} dropped, {}", msg.topic, e);
                return 0;
            }
        };

        let mut invoked = 0;
        for child in children {
            match child.kind() {
                Kind::Leaf => {
                    self.invoke(client, &child, msg);
                    invoked += 1;
                }
                Kind::Directory => log::debug!("{} is a topic, skipped", child),
                Kind::Missing => log::debug!("{} vanished from the routing tree", child),
            }
        }
        invoked
    }

    fn invoke(&self, client: &dyn Client, path: &VirtualPath, msg: &Message) {
        let handler = match path.handler() {
            Ok(handler) => handler,
            Err(e) => return self.report(path, &e),
        };
        log::debug!("Firing {} ({})", path.resolve(), handler.name());

        let start = Instant::now();
        let res = handler.handle(client, &self.root, msg);
        let elapsed = start.elapsed();
        self.stats.record(elapsed);
        log::debug!("Done in: {:?}, avg: {:?}", elapsed, self.stats.average());

        if let Err(e) = res {
            self.stats.failures.inc();
            self.report(path, &e);
        }
    }

    fn report(&self, handler: &VirtualPath, e: &MqttError) {
        let (level, line) = diagnostic(handler, e);
        log::log!(level, "{}", line);
    }
}

/// Log level and line reporting that `handler` failed with `e`.
fn diagnostic(handler: &VirtualPath, e: &MqttError) -> (log::Level, String) {
    let h = handler.resolve();
    match e {
        MqttError::NotFound(t) => (
            log::Level::Error,
            format!("Error, No such topic or handler: handler \"{}\" tried to access to \"{}\" (not existent)", h, t),
        ),
        MqttError::NotADirectory(t) => (
            log::Level::Error,
            format!("Error, Not a topic: handler \"{}\" tried to publish to topic \"{}\" (an handler)", h, t),
        ),
        MqttError::IsADirectory(t) => (
            log::Level::Error,
            format!("Error, Not a topic: handler \"{}\" tried to run handler \"{}\" (a topic)", h, t),
        ),
        MqttError::MissingField { .. } => {
            (log::Level::Info, format!("Info, handler \"{}\" ignored message, {}", h, e))
        }
        MqttError::PayloadDecode { .. } => {
            (log::Level::Warn, format!("Error, handler \"{}\" dropped message, {}", h, e))
        }
        _ => (log::Level::Error, format!("Error, handler \"{}\" failed, {}", h, e)),
    }
}

/// Dispatcher instrumentation.
#[derive(Default)]
pub struct Stats {
    pub messages: Counter,
    pub unrouted: Counter,
    pub invocations: Counter,
    pub failures: Counter,
    elapsed_nanos: AtomicU64,
}

impl Stats {
    #[inline]
    fn record(&self, elapsed: Duration) {
        self.invocations.inc();
        self.elapsed_nanos.fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
    }

    /// Total time spent in handlers.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn average(&self) -> Duration {
        match self.invocations.count() {
            n if n > 0 => Duration::from_nanos(self.elapsed_nanos.load(Ordering::Relaxed) / n as u64),
            _ => Duration::ZERO,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "messages": self.messages.count(),
            "unrouted": self.unrouted.count(),
            "invocations": self.invocations.count(),
            "failures": self.failures.count(),
            "elapsed_us": self.elapsed().as_micros() as u64,
            "average_us": self.average().as_micros() as u64,
        })
    }
}
