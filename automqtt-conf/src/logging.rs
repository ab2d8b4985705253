use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// The `[log]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Log {
    pub to: To,
    #[serde(deserialize_with = "deserialize_level")]
    pub level: slog::Level,
    pub dir: String,
    pub file: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            to: To::Console,
            level: slog::Level::Info,
            dir: "/var/log/automqtt".into(),
            file: "automqtt.log".into(),
        }
    }
}

impl Log {
    /// Log file location, `None` when no file name is configured.
    pub fn filename(&self) -> Option<PathBuf> {
        if self.file.is_empty() {
            return None;
        }
        let dir = self.dir.trim_end_matches(['/', '\\']);
        if dir.is_empty() {
            Some(PathBuf::from(&self.file))
        } else {
            Some(PathBuf::from(dir).join(&self.file))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum To {
    Off,
    File,
    Console,
    Both,
}

impl To {
    #[inline]
    pub fn file(&self) -> bool {
        matches!(self, To::Both | To::File)
    }

    #[inline]
    pub fn console(&self) -> bool {
        matches!(self, To::Both | To::Console)
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<slog::Level, D::Error>
where
    D: Deserializer<'de>,
{
    let level = String::deserialize(deserializer)?;
    slog::Level::from_str(&level).map_err(|_| de::Error::custom(format!("invalid log level `{}`", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename() {
        let log = Log::default();
        assert_eq!(log.filename(), Some(PathBuf::from("/var/log/automqtt/automqtt.log")));

        let log = Log { dir: "logs/".into(), ..Default::default() };
        assert_eq!(log.filename(), Some(PathBuf::from("logs/automqtt.log")));

        let log = Log { dir: "".into(), ..Default::default() };
        assert_eq!(log.filename(), Some(PathBuf::from("automqtt.log")));

        let log = Log { file: "".into(), ..Default::default() };
        assert_eq!(log.filename(), None);
    }

    #[test]
    fn test_targets() {
        assert!(To::Both.file() && To::Both.console());
        assert!(To::File.file() && !To::File.console());
        assert!(!To::Off.file() && !To::Off.console());
    }
}
