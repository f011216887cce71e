//! Boundary with the hosting microservice runtime.
//!
//! The runtime hands each inbound call to a handler as a [`SdkAction`]; the
//! handler returns it once the response is built. A [`SdkService`] maps action
//! names to handlers and owns the request loop.

use crate::error::Error;
use crate::response::Transport;
use crate::sql::Param;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Ordered column name -> value map for one record.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub type BoxAction = Box<dyn SdkAction>;

/// Lifecycle callback run by the runtime around its request loop.
pub type Hook = Box<dyn FnOnce() + Send>;

/// Failure raised by the runtime when it rejects a response mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SdkError {
    pub message: String,
    pub code: i64,
}

impl SdkError {
    pub fn new(message: impl Into<String>, code: i64) -> Self {
        SdkError {
            message: message.into(),
            code,
        }
    }
}

/// Foreign key(s) of a relation: one-to-one or one-to-many.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for Related {
    fn from(fk: &str) -> Self {
        Related::One(fk.to_string())
    }
}

impl From<String> for Related {
    fn from(fk: String) -> Self {
        Related::One(fk)
    }
}

impl From<Vec<String>> for Related {
    fn from(fks: Vec<String>) -> Self {
        Related::Many(fks)
    }
}

impl From<&[&str]> for Related {
    fn from(fks: &[&str]) -> Self {
        Related::Many(fks.iter().map(|s| s.to_string()).collect())
    }
}

/// One inbound action invocation: request accessors plus the response being built.
pub trait SdkAction: Send {
    /// Name of the service the action belongs to.
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn action_name(&self) -> &str;
    /// Declared params; `None` means every location.
    fn params(&self, location: Option<&str>) -> Vec<Param>;
    fn log(&self, message: &str);

    fn set_entity(&mut self, entity: Row) -> Result<(), SdkError>;
    fn set_collection(&mut self, collection: Vec<Row>) -> Result<(), SdkError>;
    fn relate_one(&mut self, pk: &str, kind: &str, fk: &str) -> Result<(), SdkError>;
    fn relate_many(&mut self, pk: &str, kind: &str, fks: &[String]) -> Result<(), SdkError>;
    fn link(&mut self, link: &str, uri: &str) -> Result<(), SdkError>;
    fn error(&mut self, message: &str, code: i64, status: &str) -> Result<(), SdkError>;

    /// Response accumulated so far.
    fn transport(&self) -> &Transport;
    fn into_transport(self: Box<Self>) -> Transport;
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, action: BoxAction) -> BoxAction;
}

#[async_trait]
impl<F, Fut> ActionHandler for F
where
    F: Fn(BoxAction) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BoxAction> + Send + 'static,
{
    async fn call(&self, action: BoxAction) -> BoxAction {
        (self)(action).await
    }
}

/// Named handlers passed to `Service::init`.
pub type Actions = Vec<(String, Arc<dyn ActionHandler>)>;

/// The runtime's service object.
#[async_trait]
pub trait SdkService: Send {
    /// Register (or replace) the handler for `name`.
    fn action(&mut self, name: &str, handler: Arc<dyn ActionHandler>);
    fn startup(&mut self, hook: Hook);
    fn shutdown(&mut self, hook: Hook);
    /// Blocks until the runtime stops serving.
    async fn run(self: Box<Self>) -> Result<(), Error>;
}

/// Strict check for `"NNN Reason"` status labels.
pub fn parse_status(status: &str) -> Option<u16> {
    let code = status.split_whitespace().next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok().filter(|c| (100..=599).contains(c))
}
