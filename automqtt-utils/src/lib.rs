//! Small helpers shared by the automqtt crates.
//!
//! - [`Counter`]: lock-free event counter used for cache and dispatch instrumentation
//! - [`to_duration`] / [`deserialize_duration`]: `"1m30s"`-style durations in configuration files
//! - [`Bytesize`] / [`to_bytesize`]: `"1M"`-style sizes in configuration files
//!
//! ```
//! use automqtt_utils::{to_duration, Bytesize};
//!
//! assert_eq!(to_duration("1m30s").as_secs(), 90);
//! assert_eq!(Bytesize::from("1M").as_u32(), 1_048_576);
//! ```

#![deny(unsafe_code)]

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use serde::{
    de::{self, Deserializer},
    ser::Serializer,
    Deserialize, Serialize,
};

mod counter;

pub use counter::Counter;

const BYTESIZE_K: usize = 1024;
const BYTESIZE_M: usize = 1048576;
const BYTESIZE_G: usize = 1073741824;

/// Byte size that (de)serializes as `"2G512M"`-style text.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Bytesize(pub usize);

impl Bytesize {
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0.min(u32::MAX as usize) as u32
    }

    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn string(&self) -> String {
        let mut v = self.0;
        let mut res = String::new();
        for (unit, size) in [('G', BYTESIZE_G), ('M', BYTESIZE_M), ('K', BYTESIZE_K)] {
            let n = v / size;
            if n > 0 {
                res.push_str(&format!("{}{}", n, unit));
                v %= size;
            }
        }
        if v > 0 || res.is_empty() {
            res.push_str(&format!("{}B", v));
        }
        res
    }
}

impl Deref for Bytesize {
    type Target = usize;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<usize> for Bytesize {
    fn from(v: usize) -> Self {
        Bytesize(v)
    }
}

impl From<&str> for Bytesize {
    fn from(v: &str) -> Self {
        Bytesize(to_bytesize(v))
    }
}

impl fmt::Debug for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}

impl Serialize for Bytesize {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.string())
    }
}

impl<'de> Deserialize<'de> for Bytesize {
    #[inline]
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let v = to_bytesize(&text);
        if v == 0 && !text.trim().starts_with('0') {
            return Err(de::Error::custom(format!("invalid byte size `{}`", text)));
        }
        Ok(Bytesize(v))
    }
}

/// Parses `"2G512K"`, `"1M"`, `"4096B"`; unknown pieces count as zero.
#[inline]
pub fn to_bytesize(text: &str) -> usize {
    let text = text.to_uppercase().replace("GB", "G").replace("MB", "M").replace("KB", "K");
    text.split_inclusive(['G', 'M', 'K', 'B'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().parse::<usize>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'B' => v,
                'K' => v * BYTESIZE_K,
                'M' => v * BYTESIZE_M,
                'G' => v * BYTESIZE_G,
                _ => 0,
            }
        })
        .sum()
}

#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    Ok(to_duration(&v))
}

/// Converts `"1h30m15s"`-style text to a [`Duration`].
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`.
#[inline]
pub fn to_duration(text: &str) -> Duration {
    let text = text.to_lowercase().replace("ms", "Y");
    let ms: u64 = text
        .split_inclusive(['s', 'm', 'h', 'd', 'w', 'Y'])
        .map(|x| {
            let mut chars = x.chars();
            let u = match chars.nth_back(0) {
                None => return 0,
                Some(u) => u,
            };
            let v = match chars.as_str().trim().parse::<u64>() {
                Err(_e) => return 0,
                Ok(v) => v,
            };
            match u {
                'Y' => v,
                's' => v * 1000,
                'm' => v * 60000,
                'h' => v * 3600000,
                'd' => v * 86400000,
                'w' => v * 604800000,
                _ => 0,
            }
        })
        .sum();
    Duration::from_millis(ms)
}
