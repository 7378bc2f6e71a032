//! Connection settings for the sinks an adapter talks to.
//!
//! [`Settings`] is plain data: where the metrics agent (Telegraf) and the
//! time-series store (InfluxDB) live, and which backend family to use. The
//! adapter itself never opens a connection; a
//! [`SinkFactory`](crate::sink::SinkFactory) reads these settings and builds
//! the sinks.
//!
//! Values come from built-in defaults, optionally a JSON file, and finally
//! upper-case environment variables of the same names (`TELEGRAF_HOST`,
//! `INFLUXDB_PORT`, `IO_MODE`, ...).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Which backend family the sinks talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Telegraf for writes, InfluxDB for reads.
    #[default]
    Influx,
}

impl FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "influx" => Ok(Self::Influx),
            other => Err(format!("unknown io mode '{other}' (expected 'influx')")),
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Influx => f.write_str("influx"),
        }
    }
}

/// Transport protocol of an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP.
    #[default]
    Http,
    /// UDP datagrams.
    Udp,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "udp" => Ok(Self::Udp),
            other => Err(format!("unknown protocol '{other}' (expected 'http' or 'udp')")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// A resolved network endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl Endpoint {
    /// Returns the endpoint as a URL, e.g. `udp://127.0.0.1:8092`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend family.
    pub io_mode: IoMode,
    /// Metrics agent host.
    pub telegraf_host: String,
    /// Metrics agent port.
    pub telegraf_port: u16,
    /// Metrics agent transport.
    pub telegraf_protocol: Protocol,
    /// Time-series store host.
    pub influxdb_host: String,
    /// Time-series store port.
    pub influxdb_port: u16,
    /// Time-series store user.
    pub influxdb_username: String,
    /// Time-series store password.
    pub influxdb_password: String,
    /// Time-series store database.
    pub influxdb_database: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            io_mode: IoMode::Influx,
            telegraf_host: "127.0.0.1".to_string(),
            telegraf_port: 8092,
            telegraf_protocol: Protocol::Http,
            influxdb_host: "127.0.0.1".to_string(),
            influxdb_port: 8086,
            influxdb_username: String::new(),
            influxdb_password: String::new(),
            influxdb_database: "telegraf".to_string(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if a variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Reads a JSON settings file, then overlays the process environment.
    ///
    /// Keys missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SettingsLoad`] or [`ConfigError::SettingsParse`]
    /// if the file cannot be read or parsed, and
    /// [`ConfigError::InvalidSetting`] for a bad environment value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_file(path.as_ref())?.overlay(|name| std::env::var(name).ok())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let settings =
            serde_json::from_str(&text).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(settings)
    }

    /// Overlays values returned by `lookup`, keyed by upper-case setting name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if a value does not parse.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("IO_MODE") {
            self.io_mode = parse_setting("IO_MODE", &v)?;
        }
        if let Some(v) = lookup("TELEGRAF_HOST") {
            self.telegraf_host = v;
        }
        if let Some(v) = lookup("TELEGRAF_PORT") {
            self.telegraf_port = parse_setting("TELEGRAF_PORT", &v)?;
        }
        if let Some(v) = lookup("TELEGRAF_PROTOCOL") {
            self.telegraf_protocol = parse_setting("TELEGRAF_PROTOCOL", &v)?;
        }
        if let Some(v) = lookup("INFLUXDB_HOST") {
            self.influxdb_host = v;
        }
        if let Some(v) = lookup("INFLUXDB_PORT") {
            self.influxdb_port = parse_setting("INFLUXDB_PORT", &v)?;
        }
        if let Some(v) = lookup("INFLUXDB_USERNAME") {
            self.influxdb_username = v;
        }
        if let Some(v) = lookup("INFLUXDB_PASSWORD") {
            self.influxdb_password = v;
        }
        if let Some(v) = lookup("INFLUXDB_DATABASE") {
            self.influxdb_database = v;
        }
        Ok(self)
    }

    /// The metrics agent endpoint.
    pub fn telegraf_endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.telegraf_host.clone(),
            port: self.telegraf_port,
            protocol: self.telegraf_protocol,
        }
    }

    /// The time-series store endpoint (always HTTP).
    pub fn influxdb_endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.influxdb_host.clone(),
            port: self.influxdb_port,
            protocol: Protocol::Http,
        }
    }

    /// Returns a copy safe to display, with a set password masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if !shown.influxdb_password.is_empty() {
            shown.influxdb_password = "***".to_string();
        }
        shown
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        ConfigError::InvalidSetting {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
