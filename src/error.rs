//! Typed errors and the integer codes reported on the response.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::sdk::SdkError;

/// Code reported when a script action's SQL file cannot be read.
pub const SCRIPT_UNREADABLE: i64 = 1001;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("missing settings section [{0}]")]
    MissingSection(String),
    #[error("missing settings key [{section}] {key}")]
    MissingKey { section: String, key: String },
    #[error("invalid settings value [{section}] {key}: {message}")]
    Invalid {
        section: String,
        key: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("database connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Sdk(#[from] SdkError),
    #[error("plugin not found: {0}")]
    PluginNotFound(String),
    #[error("invalid plugin {name}: not registered for {owner}")]
    InvalidPlugin { name: String, owner: &'static str },
    #[error("plugin: {0}")]
    Plugin(String),
    #[error("script {path} is not readable: {source}")]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Integer code forwarded to the response's error slot.
    pub fn code(&self) -> i64 {
        match self {
            Error::Config(_) => 1,
            Error::Db(_) => 2,
            Error::ConnectTimeout(_) => 3,
            Error::InvalidIdentifier(_) => 4,
            Error::Payload(_) => 5,
            Error::Sdk(e) => e.code,
            Error::PluginNotFound(_) => 6,
            Error::InvalidPlugin { .. } => 7,
            Error::Plugin(_) => 8,
            Error::ScriptUnreadable { .. } => SCRIPT_UNREADABLE,
            Error::Io(_) => 9,
            Error::Json(_) => 10,
        }
    }
}
