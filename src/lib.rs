//! Tao SDK: database-backed action helpers for microservice runtimes.
//!
//! An [`Action`] wraps one inbound call: it turns request params into a
//! PostgreSQL function call, runs it on a lazily opened connection and writes
//! rows, relations, links and errors back into the response. A [`Service`]
//! registers handlers (plus the built-in `status` action) with a runtime.

pub mod action;
pub mod config;
pub mod db;
pub mod error;
pub mod mock;
pub mod plugin;
pub mod response;
pub mod routes;
pub mod sdk;
pub mod service;
pub mod sql;
pub mod state;

pub use action::{Action, ERROR_STATUS, PARAMS_PLACEHOLDER};
pub use config::{DatabaseSettings, ServiceSettings, Settings};
pub use db::{Connector, Database, PgConnector};
pub use error::{ConfigError, Error, SCRIPT_UNREADABLE};
pub use plugin::{Plugin, Plugins};
pub use response::{Data, Transport};
pub use routes::{HttpAction, HttpService};
pub use sdk::{ActionHandler, Actions, BoxAction, Related, Row, SdkAction, SdkError, SdkService};
pub use service::{Service, STATUS_ACTION};
pub use sql::{Param, ParamSource, ParamType};
pub use state::Context;
