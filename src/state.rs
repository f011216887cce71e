//! Process-wide context shared by the service and every action it creates.

use crate::config::Settings;
use crate::db::{Connector, PgConnector};
use crate::error::ConfigError;
use crate::plugin::Plugins;
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub connector: Arc<dyn Connector>,
    /// Populated at startup; looked up by name when a wrapper asks for a plugin.
    pub plugins: Arc<Plugins>,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        Context {
            settings: Arc::new(settings),
            connector: Arc::new(PgConnector),
            plugins: Arc::new(Plugins::new()),
        }
    }

    /// Settings from the default directory (see `Settings::load_default`).
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Context::new(Settings::load_default()?))
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn with_plugins(mut self, plugins: Plugins) -> Self {
        self.plugins = Arc::new(plugins);
        self
    }
}
