//! Per-request helper around one inbound [`SdkAction`].
//!
//! Resolves settings through the shared [`Context`], opens the database on first
//! use, marshals request params into SQL function calls and writes results into
//! the response. Failures on the response path are reported on the response
//! itself; only plugin lookups return errors to the caller.

use crate::config::Settings;
use crate::db::DatabaseSlot;
use crate::error::{Error, SCRIPT_UNREADABLE};
use crate::plugin::{self, PluginHost, PluginSlots, Plugins};
use crate::sdk::{BoxAction, Related, Row, SdkAction};
use crate::sql::{function_call, marshal_explicit, marshal_params, ParamSource};
use crate::state::Context;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Status used when the caller gives none, and as the fallback when reporting fails.
pub const ERROR_STATUS: &str = "500 Internal Server Error";

/// Placeholder in script files replaced by the marshalled request params.
pub const PARAMS_PLACEHOLDER: &str = "{params}";

pub struct Action {
    context: Context,
    action: BoxAction,
    database: DatabaseSlot,
    plugins: PluginSlots<Action>,
}

impl Action {
    pub fn init(action: BoxAction, context: Context) -> Self {
        Action {
            context,
            action,
            database: DatabaseSlot::default(),
            plugins: PluginSlots::default(),
        }
    }

    pub fn action(&self) -> &dyn SdkAction {
        self.action.as_ref()
    }

    pub fn action_mut(&mut self) -> &mut dyn SdkAction {
        self.action.as_mut()
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Hand the action back to the runtime.
    pub fn run(self) -> BoxAction {
        self.action
    }

    pub fn log(&self, message: &str) {
        self.action.log(message);
    }

    /// Run raw SQL on this action's connection.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        let db = self.database.get(&self.context).await?;
        db.query(sql).await
    }

    pub fn has_connection(&self) -> bool {
        self.database.is_open()
    }

    /// The `p_name := literal, ...` list for `source`; empty when there are no params.
    pub fn params(&self, source: &ParamSource) -> Result<String, Error> {
        match source {
            ParamSource::None => Ok(String::new()),
            ParamSource::All => marshal_params(&self.action.params(None)),
            ParamSource::Location(location) => marshal_params(&self.action.params(Some(location))),
            ParamSource::Explicit(items) => marshal_explicit(items),
        }
    }

    async fn call(&mut self, function: &str, source: &ParamSource) -> Result<Vec<Row>, Error> {
        let params = self.params(source)?;
        let sql = function_call(function, &params)?;
        self.query(&sql).await
    }

    /// First row of `function(params)`, `None` when it returns no rows.
    pub async fn fetch_entity(&mut self, function: &str, source: ParamSource) -> Result<Option<Row>, Error> {
        let rows = self.call(function, &source).await?;
        Ok(rows.into_iter().next())
    }

    /// Every row of `function(params)`.
    pub async fn fetch_collection(&mut self, function: &str, source: ParamSource) -> Result<Vec<Row>, Error> {
        self.call(function, &source).await
    }

    /// Set the entity from a literal. `null` becomes an empty entity; non-objects are reported.
    pub fn set_entity<T: Serialize>(&mut self, entity: T) -> &mut Self {
        let outcome = to_entity(entity).and_then(|row| Ok(self.action.set_entity(row)?));
        self.settle(outcome)
    }

    /// Set the collection from a literal. `null` becomes an empty list; anything but a list of objects is reported.
    pub fn set_collection<T: Serialize>(&mut self, collection: T) -> &mut Self {
        let outcome = to_collection(collection).and_then(|rows| Ok(self.action.set_collection(rows)?));
        self.settle(outcome)
    }

    /// Entity from the first row of `function(params)`; an empty entity when there are no rows.
    pub async fn entity(&mut self, function: &str, source: ParamSource) -> &mut Self {
        let outcome = match self.fetch_entity(function, source).await {
            Ok(row) => {
                if row.is_none() {
                    tracing::debug!(function = %function, "no rows, empty entity");
                }
                self.action.set_entity(row.unwrap_or_default()).map_err(Error::from)
            }
            Err(e) => Err(e),
        };
        self.settle(outcome)
    }

    /// Collection from every row of `function(params)`.
    pub async fn collection(&mut self, function: &str, source: ParamSource) -> &mut Self {
        let outcome = match self.fetch_collection(function, source).await {
            Ok(rows) => self.action.set_collection(rows).map_err(Error::from),
            Err(e) => Err(e),
        };
        self.settle(outcome)
    }

    /// Run the SQL in `path` (with `{params}` replaced by every request param) as the collection.
    pub async fn script(&mut self, path: &Path) -> &mut Self {
        let sql = match tokio::fs::read_to_string(path).await {
            Ok(sql) => sql,
            Err(source) => {
                let err = Error::ScriptUnreadable {
                    path: path.to_path_buf(),
                    source,
                };
                return self.error(err.to_string(), SCRIPT_UNREADABLE);
            }
        };
        let outcome = match self.expand_script(&sql) {
            Ok(sql) => match self.query(&sql).await {
                Ok(rows) => self.action.set_collection(rows).map_err(Error::from),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        self.settle(outcome)
    }

    fn expand_script(&self, sql: &str) -> Result<String, Error> {
        if !sql.contains(PARAMS_PLACEHOLDER) {
            return Ok(sql.to_string());
        }
        let params = self.params(&ParamSource::All)?;
        Ok(sql.replace(PARAMS_PLACEHOLDER, &params))
    }

    /// Relate the current entity to `kind` by one or many foreign keys.
    pub fn relation(&mut self, pk: &str, kind: &str, fk: impl Into<Related>) -> &mut Self {
        let outcome = match fk.into() {
            Related::One(fk) => self.action.relate_one(pk, kind, &fk),
            Related::Many(fks) => self.action.relate_many(pk, kind, &fks),
        };
        self.settle(outcome.map_err(Error::from))
    }

    pub fn link(&mut self, link: &str, uri: &str) -> &mut Self {
        let outcome = self.action.link(link, uri).map_err(Error::from);
        self.settle(outcome)
    }

    /// Record an error with the default 500 status.
    pub fn error(&mut self, message: impl Into<String>, code: i64) -> &mut Self {
        self.error_with_status(message, code, ERROR_STATUS)
    }

    /// Record an error; if the runtime rejects it, record the rejection with the 500 status instead.
    pub fn error_with_status(&mut self, message: impl Into<String>, code: i64, status: &str) -> &mut Self {
        let message = message.into();
        tracing::warn!(code, status, "{}", message);
        if let Err(e) = self.action.error(&message, code, status) {
            if let Err(fallback) = self.action.error(&e.message, e.code, ERROR_STATUS) {
                tracing::error!(error = %fallback, original = %message, "error could not be recorded");
            }
        }
        self
    }

    /// Report `err` on the response.
    pub fn report(&mut self, err: &Error) -> &mut Self {
        self.error(err.to_string(), err.code())
    }

    fn settle(&mut self, outcome: Result<(), Error>) -> &mut Self {
        if let Err(e) = outcome {
            self.report(&e);
        }
        self
    }

    /// Run plugin `name` with `args`, creating it on first use.
    pub async fn plugin(&mut self, name: &str, args: &[Value]) -> Result<&mut Self, Error> {
        plugin::dispatch(self, name, args).await?;
        Ok(self)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }
}

impl PluginHost for Action {
    fn registry(&self) -> &Plugins {
        &self.context.plugins
    }

    fn slots(&mut self) -> &mut PluginSlots<Self> {
        &mut self.plugins
    }
}

fn to_entity<T: Serialize>(entity: T) -> Result<Row, Error> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Row::new()),
        other => Err(Error::Payload(format!("entity must be an object, got {}", kind(&other)))),
    }
}

fn to_collection<T: Serialize>(collection: T) -> Result<Vec<Row>, Error> {
    match serde_json::to_value(collection)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(Error::Payload(format!(
                    "collection items must be objects, got {}",
                    kind(&other)
                ))),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Payload(format!("collection must be a list, got {}", kind(&other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
