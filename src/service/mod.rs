//! Per-process helper: registers action handlers with the runtime and runs it.

mod scripts;
mod status;

pub use scripts::script_actions;
pub use status::{status_handler, StatusBody, STATUS_ACTION};

use crate::config::Settings;
use crate::db::DatabaseSlot;
use crate::error::{ConfigError, Error};
use crate::plugin::{self, PluginHost, PluginSlots, Plugins};
use crate::routes::HttpService;
use crate::sdk::{ActionHandler, Actions, Row, SdkService};
use crate::state::Context;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub struct Service {
    context: Context,
    service: Box<dyn SdkService>,
    database: DatabaseSlot,
    plugins: PluginSlots<Service>,
}

impl Service {
    /// Wrap `service`, register the built-in `status` action, then `actions` in order.
    pub fn init(context: Context, service: Box<dyn SdkService>, actions: Actions) -> Self {
        let mut instance = Service {
            context,
            service,
            database: DatabaseSlot::default(),
            plugins: PluginSlots::default(),
        };
        let status = status_handler(instance.context.clone());
        instance.register(STATUS_ACTION, Arc::new(status));
        for (name, handler) in actions {
            instance.register(&name, handler);
        }
        instance
    }

    /// [`Service::init`] around the bundled HTTP runtime, configured from `[service]`.
    pub fn http(context: Context, actions: Actions) -> Result<Self, ConfigError> {
        let runtime = HttpService::new(context.settings.service()?);
        Ok(Service::init(context, Box::new(runtime), actions))
    }

    fn register(&mut self, name: &str, handler: Arc<dyn ActionHandler>) {
        tracing::info!(action = %name, "action registered");
        self.service.action(name, handler);
    }

    /// Register one more action after construction.
    pub fn action(&mut self, name: &str, handler: impl ActionHandler + 'static) -> &mut Self {
        self.register(name, Arc::new(handler));
        self
    }

    /// Register one action per `*.sql` file in `dir`, named after the file stem.
    pub fn scripts(&mut self, dir: &Path) -> Result<&mut Self, Error> {
        for (name, handler) in script_actions(dir, &self.context)? {
            self.register(&name, handler);
        }
        Ok(self)
    }

    pub fn startup(&mut self, hook: impl FnOnce() + Send + 'static) -> &mut Self {
        self.service.startup(Box::new(hook));
        self
    }

    pub fn shutdown(&mut self, hook: impl FnOnce() + Send + 'static) -> &mut Self {
        self.service.shutdown(Box::new(hook));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run raw SQL on the service's own connection (opened once, on first use).
    pub async fn query(&mut self, sql: &str) -> Result<Vec<Row>, Error> {
        let db = self.database.get(&self.context).await?;
        db.query(sql).await
    }

    /// Run plugin `name` with `args`, creating it on first use.
    pub async fn plugin(&mut self, name: &str, args: &[Value]) -> Result<&mut Self, Error> {
        plugin::dispatch(self, name, args).await?;
        Ok(self)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains(name)
    }

    /// Hand control to the runtime's request loop.
    pub async fn run(self) -> Result<(), Error> {
        tracing::info!("service starting");
        let outcome = self.service.run().await;
        tracing::info!("service stopped");
        outcome
    }
}

impl PluginHost for Service {
    fn registry(&self) -> &Plugins {
        &self.context.plugins
    }

    fn slots(&mut self) -> &mut PluginSlots<Self> {
        &mut self.plugins
    }
}
