//! Test doubles for the runtime and database boundaries.
//!
//! Useful in unit and integration tests where a live runtime or PostgreSQL
//! instance is unavailable or irrelevant.

use crate::config::DatabaseSettings;
use crate::db::{Connector, Database};
use crate::error::Error;
use crate::response::{Data, Relation, Transport};
use crate::sdk::{ActionHandler, BoxAction, Hook, Related, Row, SdkAction, SdkError, SdkService};
use crate::sql::Param;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An inbound action with fixed params that records the response in memory.
pub struct MockAction {
    pub service: String,
    pub version: String,
    pub action: String,
    pub params: Vec<Param>,
    pub transport: Transport,
    /// `error()` fails when called with one of these statuses.
    pub rejected_statuses: Vec<String>,
    /// `link()` and relation calls fail when set.
    pub reject_links: bool,
    pub logs: Arc<Mutex<Vec<String>>>,
}

impl MockAction {
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        MockAction {
            service: service.into(),
            version: version.into(),
            action: "test".into(),
            params: Vec::new(),
            transport: Transport::default(),
            rejected_statuses: Vec::new(),
            reject_links: false,
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    pub fn rejecting_status(mut self, status: impl Into<String>) -> Self {
        self.rejected_statuses.push(status.into());
        self
    }

    pub fn rejecting_links(mut self) -> Self {
        self.reject_links = true;
        self
    }

    pub fn boxed(self) -> BoxAction {
        Box::new(self)
    }
}

impl SdkAction for MockAction {
    fn name(&self) -> &str {
        &self.service
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn action_name(&self) -> &str {
        &self.action
    }

    fn params(&self, location: Option<&str>) -> Vec<Param> {
        self.params
            .iter()
            .filter(|p| location.is_none() || p.location.as_deref() == location)
            .cloned()
            .collect()
    }

    fn log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn set_entity(&mut self, entity: Row) -> Result<(), SdkError> {
        self.transport.data = Some(Data::Entity(entity));
        Ok(())
    }

    fn set_collection(&mut self, collection: Vec<Row>) -> Result<(), SdkError> {
        self.transport.data = Some(Data::Collection(collection));
        Ok(())
    }

    fn relate_one(&mut self, pk: &str, kind: &str, fk: &str) -> Result<(), SdkError> {
        self.relate(pk, kind, Related::One(fk.to_string()))
    }

    fn relate_many(&mut self, pk: &str, kind: &str, fks: &[String]) -> Result<(), SdkError> {
        self.relate(pk, kind, Related::Many(fks.to_vec()))
    }

    fn link(&mut self, link: &str, uri: &str) -> Result<(), SdkError> {
        if self.reject_links {
            return Err(SdkError::new(format!("link {} rejected", link), 21));
        }
        self.transport.links.insert(link.to_string(), uri.to_string());
        Ok(())
    }

    fn error(&mut self, message: &str, code: i64, status: &str) -> Result<(), SdkError> {
        if self.rejected_statuses.iter().any(|s| s == status) {
            return Err(SdkError::new(format!("invalid status: {}", status), 22));
        }
        self.transport.push_error(message, code, status);
        Ok(())
    }

    fn transport(&self) -> &Transport {
        &self.transport
    }

    fn into_transport(self: Box<Self>) -> Transport {
        self.transport
    }
}

impl MockAction {
    fn relate(&mut self, pk: &str, kind: &str, fk: Related) -> Result<(), SdkError> {
        if self.reject_links {
            return Err(SdkError::new(format!("relation {} rejected", kind), 23));
        }
        self.transport.relations.push(Relation {
            pk: pk.to_string(),
            kind: kind.to_string(),
            fk,
        });
        Ok(())
    }
}

/// Shared record of what the mock connections saw.
#[derive(Default)]
struct DatabaseLog {
    connects: AtomicUsize,
    statements: Mutex<Vec<String>>,
}

/// Hands out [`MockDatabase`]s that return canned rows or fail every query.
#[derive(Clone)]
pub struct MockConnector {
    rows: Vec<Row>,
    failure: Option<String>,
    refuse: bool,
    log: Arc<DatabaseLog>,
}

impl MockConnector {
    /// Every query returns `rows`; non-object values are skipped.
    pub fn returning(rows: Vec<Value>) -> Self {
        MockConnector {
            rows: rows
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            failure: None,
            refuse: false,
            log: Arc::new(DatabaseLog::default()),
        }
    }

    /// Connections open, every query fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut connector = MockConnector::returning(Vec::new());
        connector.failure = Some(message.into());
        connector
    }

    /// Connecting itself fails.
    pub fn refusing() -> Self {
        let mut connector = MockConnector::returning(Vec::new());
        connector.refuse = true;
        connector
    }

    pub fn connects(&self) -> usize {
        self.log.connects.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _settings: &DatabaseSettings) -> Result<Box<dyn Database>, Error> {
        if self.refuse {
            return Err(Error::Db(sqlx::Error::PoolTimedOut));
        }
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDatabase {
            rows: self.rows.clone(),
            failure: self.failure.clone(),
            log: self.log.clone(),
        }))
    }
}

pub struct MockDatabase {
    rows: Vec<Row>,
    failure: Option<String>,
    log: Arc<DatabaseLog>,
}

#[async_trait]
impl Database for MockDatabase {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        self.log.statements.lock().unwrap().push(sql.to_string());
        match &self.failure {
            Some(message) => Err(Error::Db(sqlx::Error::Protocol(message.clone()))),
            None => Ok(self.rows.clone()),
        }
    }
}

#[derive(Default)]
struct ServiceLog {
    handlers: Mutex<HashMap<String, Arc<dyn ActionHandler>>>,
    order: Mutex<Vec<String>>,
    events: Mutex<Vec<&'static str>>,
    startup: Mutex<Vec<Hook>>,
    shutdown: Mutex<Vec<Hook>>,
}

/// In-memory runtime. Clones share state, so a test can keep one handle
/// while the [`Service`](crate::Service) owns another.
#[derive(Clone, Default)]
pub struct MockService {
    log: Arc<ServiceLog>,
}

impl MockService {
    /// Action names in registration order (repeats included).
    pub fn registered(&self) -> Vec<String> {
        self.log.order.lock().unwrap().clone()
    }

    /// Lifecycle events seen by `run`: "startup", "run", "shutdown".
    pub fn events(&self) -> Vec<&'static str> {
        self.log.events.lock().unwrap().clone()
    }

    /// Invoke the handler registered for `name`, as the runtime would.
    pub async fn dispatch(&self, name: &str, action: MockAction) -> Option<Transport> {
        let handler = self.log.handlers.lock().unwrap().get(name).cloned()?;
        Some(handler.call(action.boxed()).await.into_transport())
    }
}

#[async_trait]
impl SdkService for MockService {
    fn action(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        self.log.order.lock().unwrap().push(name.to_string());
        self.log.handlers.lock().unwrap().insert(name.to_string(), handler);
    }

    fn startup(&mut self, hook: Hook) {
        self.log.startup.lock().unwrap().push(hook);
    }

    fn shutdown(&mut self, hook: Hook) {
        self.log.shutdown.lock().unwrap().push(hook);
    }

    async fn run(self: Box<Self>) -> Result<(), Error> {
        self.log.events.lock().unwrap().push("startup");
        let startup: Vec<Hook> = std::mem::take(&mut *self.log.startup.lock().unwrap());
        for hook in startup {
            hook();
        }
        self.log.events.lock().unwrap().push("run");
        let shutdown: Vec<Hook> = std::mem::take(&mut *self.log.shutdown.lock().unwrap());
        for hook in shutdown {
            hook();
        }
        self.log.events.lock().unwrap().push("shutdown");
        Ok(())
    }
}
