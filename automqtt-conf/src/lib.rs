#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File};
use once_cell::sync::OnceCell;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use automqtt_utils::{deserialize_duration, Bytesize};

use self::logging::Log;

pub use self::options::Options;

pub mod logging;
pub mod options;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub mqtt: Mqtt,
    #[serde(default)]
    pub devices: Devices,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/automqtt/automqtt").required(false))
            .add_source(File::with_name("automqtt").required(false));

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("automqtt")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("devices.power_members")
                .with_list_parse_key("devices.timer_members"),
        );

        Self::build(builder, opts)
    }

    fn build(builder: ConfigBuilder<DefaultState>, opts: Options) -> Result<Self> {
        let mut inner: Inner = builder.build()?.try_deserialize()?;

        //Command line configuration overriding file configuration
        if let Some(server) = opts.server.as_ref() {
            inner.mqtt.server = ServerAddr::from_str(server)?;
        }
        if let Some(client_id) = opts.client_id.as_ref() {
            inner.mqtt.client_id.clone_from(client_id);
        }
        if let Some(username) = opts.username.as_ref() {
            inner.mqtt.username = Some(username.clone());
        }

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    #[inline]
    pub fn instance() -> Result<&'static Self> {
        SETTINGS.get().ok_or_else(|| anyhow!("Settings not initialized"))
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() -> Result<()> {
        let cfg = Self::instance()?;
        log::debug!("Config info is {:?}", cfg.0);
        log::info!("mqtt.server is {}", cfg.mqtt.server);
        log::info!("mqtt.client_id is {}", cfg.mqtt.client_id);
        log::info!("mqtt.keepalive is {:?}", cfg.mqtt.keepalive);
        log::info!("mqtt.reconnect_interval is {:?}", cfg.mqtt.reconnect_interval);
        log::info!("devices config is: {:?}", cfg.devices);
        Ok(())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Clone, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Mqtt::server_default", deserialize_with = "Mqtt::deserialize_server")]
    pub server: ServerAddr,
    #[serde(default = "Mqtt::client_id_default")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "Mqtt::clean_session_default")]
    pub clean_session: bool,
    #[serde(default = "Mqtt::keepalive_default", deserialize_with = "deserialize_duration")]
    pub keepalive: Duration,
    #[serde(default = "Mqtt::connect_timeout_default", deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(default = "Mqtt::reconnect_interval_default", deserialize_with = "deserialize_duration")]
    pub reconnect_interval: Duration,
    #[serde(default = "Mqtt::max_packet_size_default")]
    pub max_packet_size: Bytesize,
}

impl Default for Mqtt {
    #[inline]
    fn default() -> Self {
        Self {
            server: Self::server_default(),
            client_id: Self::client_id_default(),
            username: None,
            password: None,
            clean_session: Self::clean_session_default(),
            keepalive: Self::keepalive_default(),
            connect_timeout: Self::connect_timeout_default(),
            reconnect_interval: Self::reconnect_interval_default(),
            max_packet_size: Self::max_packet_size_default(),
        }
    }
}

impl Mqtt {
    fn server_default() -> ServerAddr {
        ServerAddr { typ: AddrType::Tcp, addr: "127.0.0.1:1883".into() }
    }

    fn client_id_default() -> String {
        "automqtt".into()
    }

    fn clean_session_default() -> bool {
        true
    }

    fn keepalive_default() -> Duration {
        Duration::from_secs(60)
    }

    fn connect_timeout_default() -> Duration {
        Duration::from_secs(20)
    }

    fn reconnect_interval_default() -> Duration {
        Duration::from_secs(5)
    }

    fn max_packet_size_default() -> Bytesize {
        Bytesize::from("1M")
    }

    #[inline]
    pub fn deserialize_server<'de, D>(deserializer: D) -> std::result::Result<ServerAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let addr: String = String::deserialize(deserializer)?;
        ServerAddr::from_str(&addr).map_err(de::Error::custom)
    }
}

impl fmt::Debug for Mqtt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mqtt")
            .field("server", &self.server)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("clean_session", &self.clean_session)
            .field("keepalive", &self.keepalive)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("max_packet_size", &self.max_packet_size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    Tcp,
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub typ: AddrType,
    pub addr: String,
}

impl ServerAddr {
    #[inline]
    pub fn is_tls(&self) -> bool {
        matches!(self.typ, AddrType::Tls)
    }

    /// Host part of `addr`, used as the TLS server name.
    #[inline]
    pub fn host(&self) -> &str {
        match self.addr.rsplit_once(':') {
            Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => &self.addr,
        }
    }
}

impl FromStr for ServerAddr {
    type Err = anyhow::Error;

    fn from_str(addr: &str) -> Result<Self> {
        let addr_split = addr.splitn(2, "://").collect::<Vec<_>>();
        match addr_split.as_slice() {
            [""] => Err(anyhow!("invalid server address, {:?}", addr)),
            [addr] => Ok(ServerAddr { typ: AddrType::Tcp, addr: (*addr).into() }),
            [scheme, addr] => {
                let typ = match scheme.to_lowercase().as_str() {
                    "tcp" | "mqtt" => AddrType::Tcp,
                    "tls" | "mqtts" | "ssl" => AddrType::Tls,
                    _ => return Err(anyhow!("invalid server address, {:?}", addr)),
                };
                Ok(ServerAddr { typ, addr: (*addr).into() })
            }
            _ => Err(anyhow!("invalid server address, {:?}", addr)),
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            AddrType::Tcp => write!(f, "tcp://{}", self.addr),
            AddrType::Tls => write!(f, "tls://{}", self.addr),
        }
    }
}

/// Device names used to build the routing table.
#[derive(Debug, Clone, Deserialize)]
pub struct Devices {
    /// Group topic reporting whether every device is powered
    #[serde(default = "Devices::power_group_default")]
    pub power_group: String,
    #[serde(default = "Devices::power_members_default")]
    pub power_members: Vec<String>,
    /// Group topic whose members share a power state and a synchronized timer
    #[serde(default = "Devices::timer_group_default")]
    pub timer_group: String,
    #[serde(default = "Devices::timer_members_default")]
    pub timer_members: Vec<String>,
    #[serde(default = "Devices::timer_index_default")]
    pub timer_index: u8,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            power_group: Self::power_group_default(),
            power_members: Self::power_members_default(),
            timer_group: Self::timer_group_default(),
            timer_members: Self::timer_members_default(),
            timer_index: Self::timer_index_default(),
        }
    }
}

impl Devices {
    fn power_group_default() -> String {
        "tasmotas".into()
    }

    fn power_members_default() -> Vec<String> {
        vec!["LUCE-pw".into(), "tasmota-plug-1".into(), "tasmota-plug-2".into(), "tasmota-plug-3".into()]
    }

    fn timer_group_default() -> String {
        "onlyfans".into()
    }

    fn timer_members_default() -> Vec<String> {
        vec!["tasmota-plug-2".into(), "tasmota-plug-3".into()]
    }

    fn timer_index_default() -> u8 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load(toml: &str, opts: Options) -> Settings {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Settings::build(builder, opts).unwrap()
    }

    #[test]
    fn defaults() {
        let s = load("", Options::default());
        assert_eq!(s.mqtt.server, ServerAddr { typ: AddrType::Tcp, addr: "127.0.0.1:1883".into() });
        assert_eq!(s.mqtt.client_id, "automqtt");
        assert_eq!(s.mqtt.reconnect_interval, Duration::from_secs(5));
        assert_eq!(s.devices.power_group, "tasmotas");
        assert_eq!(s.devices.timer_members.len(), 2);
        assert!(s.log.to.console());
    }

    #[test]
    fn file_values() {
        let s = load(
            r#"
            [log]
            to = "both"
            level = "debug"

            [mqtt]
            server = "tls://broker.example.org:8883"
            username = "automqtt"
            password = "secret"
            keepalive = "30s"
            max_packet_size = "256K"

            [devices]
            timer_members = ["a", "b", "c"]
            timer_index = 2
            "#,
            Options::default(),
        );
        assert!(s.mqtt.server.is_tls());
        assert_eq!(s.mqtt.server.host(), "broker.example.org");
        assert_eq!(s.mqtt.keepalive, Duration::from_secs(30));
        assert_eq!(s.mqtt.max_packet_size.as_usize(), 256 * 1024);
        assert_eq!(s.devices.timer_members, vec!["a", "b", "c"]);
        assert_eq!(s.devices.timer_index, 2);
        assert_eq!(s.log.level, slog::Level::Debug);
        assert_eq!(s.log.to, logging::To::Both);
        assert!(!format!("{:?}", s.mqtt).contains("secret"));
    }

    #[test]
    fn command_line_overrides() {
        let opts = Options {
            server: Some("tcp://10.0.0.2:1883".into()),
            client_id: Some("automqtt-test".into()),
            ..Default::default()
        };
        let s = load("[mqtt]\nserver = \"tls://broker:8883\"\n", opts);
        assert!(!s.mqtt.server.is_tls());
        assert_eq!(s.mqtt.server.addr, "10.0.0.2:1883");
        assert_eq!(s.mqtt.client_id, "automqtt-test");
    }

    #[test]
    fn server_addr_parsing() {
        assert!(ServerAddr::from_str("").is_err());
        assert!(ServerAddr::from_str("udp://host:1").is_err());
        let addr = ServerAddr::from_str("mqtts://[::1]:8883").unwrap();
        assert!(addr.is_tls());
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.to_string(), "tls://[::1]:8883");
    }
}
