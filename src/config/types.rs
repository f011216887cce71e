//! Settings storage and typed views over its sections.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::time::Duration;

/// One `[section]` of key/value pairs.
pub type Section = HashMap<String, String>;

/// Two-level settings map: section -> key -> value. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    sections: HashMap<String, Section>,
}

impl Settings {
    pub fn from_sections(sections: HashMap<String, Section>) -> Self {
        Settings { sections }
    }

    /// Overlay `local` onto `base`. A section present in `local` replaces the base section.
    pub fn merge(base: Settings, local: Settings) -> Self {
        let mut sections = base.sections;
        sections.extend(local.sections);
        Settings { sections }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn require(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        let values = self
            .sections
            .get(section)
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))?;
        values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The `[database]` section.
    pub fn database(&self) -> Result<DatabaseSettings, ConfigError> {
        let dsn = self.require("database", "dsn")?.to_string();
        let connect_timeout = match self.get("database", "connect_timeout") {
            Some(raw) => Duration::from_secs(parse_number("database", "connect_timeout", raw)?),
            None => DatabaseSettings::DEFAULT_CONNECT_TIMEOUT,
        };
        Ok(DatabaseSettings {
            dsn,
            username: self.get("database", "username").map(String::from),
            password: self.get("database", "password").map(String::from),
            connect_timeout,
        })
    }

    /// The `[service]` section; every key is optional.
    pub fn service(&self) -> Result<ServiceSettings, ConfigError> {
        let defaults = ServiceSettings::default();
        let body_limit = match self.get("service", "body_limit") {
            Some(raw) => parse_number("service", "body_limit", raw)? as usize,
            None => defaults.body_limit,
        };
        Ok(ServiceSettings {
            name: self.get("service", "name").map(String::from).unwrap_or(defaults.name),
            version: self
                .get("service", "version")
                .map(String::from)
                .unwrap_or(defaults.version),
            address: self
                .get("service", "address")
                .map(String::from)
                .unwrap_or(defaults.address),
            body_limit,
        })
    }
}

fn parse_number(section: &str, key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        section: section.to_string(),
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Connection settings. `dsn` is either a `postgres://` URL or a `pgsql:host=..;dbname=..` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl DatabaseSettings {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub name: String,
    pub version: String,
    pub address: String,
    /// Max request body size in bytes.
    pub body_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            name: "service".into(),
            version: "1.0.0".into(),
            address: "0.0.0.0:3000".into(),
            body_limit: 1024 * 1024,
        }
    }
}
