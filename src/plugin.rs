//! Named, lazily created extensions bound to an [`Action`](crate::Action) or a
//! [`Service`](crate::Service).
//!
//! Factories are registered once at startup in [`Plugins`]. The first time a
//! wrapper asks for a name, the factory builds an instance from the wrapper and
//! the wrapper caches it; later calls reuse that instance. Every call runs it.

use crate::error::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An extension whose owner is `O`.
#[async_trait]
pub trait Plugin<O>: Send {
    async fn run(&mut self, owner: &mut O, args: &[Value]) -> Result<(), Error>;
}

/// Builds a plugin from the wrapper that first asks for it.
pub type PluginFactory<O> = Arc<dyn Fn(&O) -> Box<dyn Plugin<O>> + Send + Sync>;

struct Registered {
    owner: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

/// Registry of plugin factories keyed by canonical name.
#[derive(Default)]
pub struct Plugins {
    factories: HashMap<String, Registered>,
}

/// Upper-cases the first character, so `cache` and `Cache` name the same plugin.
pub fn canonical_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Plugins {
    pub fn new() -> Self {
        Plugins::default()
    }

    /// Register `factory` for owner type `O`. A later registration under the same name replaces it.
    pub fn register<O, F, P>(&mut self, name: &str, factory: F) -> &mut Self
    where
        O: Send + 'static,
        F: Fn(&O) -> P + Send + Sync + 'static,
        P: Plugin<O> + 'static,
    {
        let factory: PluginFactory<O> =
            Arc::new(move |owner: &O| -> Box<dyn Plugin<O>> { Box::new(factory(owner)) });
        self.factories.insert(
            canonical_name(name),
            Registered {
                owner: type_name::<O>(),
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Builder form of [`Plugins::register`].
    pub fn with<O, F, P>(mut self, name: &str, factory: F) -> Self
    where
        O: Send + 'static,
        F: Fn(&O) -> P + Send + Sync + 'static,
        P: Plugin<O> + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&canonical_name(name))
    }

    /// Build a fresh instance of `name` for `owner`.
    pub fn instantiate<O: Send + 'static>(&self, name: &str, owner: &O) -> Result<Box<dyn Plugin<O>>, Error> {
        let key = canonical_name(name);
        let entry = self
            .factories
            .get(&key)
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
        let factory = entry
            .factory
            .downcast_ref::<PluginFactory<O>>()
            .ok_or_else(|| Error::InvalidPlugin {
                name: key.clone(),
                owner: type_name::<O>(),
            })?;
        tracing::debug!(plugin = %key, owner = entry.owner, "plugin created");
        Ok(factory(owner))
    }
}

/// Live plugin instances owned by one wrapper.
pub struct PluginSlots<O> {
    live: HashMap<String, Box<dyn Plugin<O>>>,
    /// Names whose instance is out of `live` because it is running.
    running: HashSet<String>,
}

impl<O> Default for PluginSlots<O> {
    fn default() -> Self {
        PluginSlots {
            live: HashMap::new(),
            running: HashSet::new(),
        }
    }
}

impl<O> PluginSlots<O> {
    pub fn contains(&self, name: &str) -> bool {
        self.live.contains_key(&canonical_name(name))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// A wrapper that can own plugins.
pub trait PluginHost: Send + Sized + 'static {
    fn registry(&self) -> &Plugins;
    fn slots(&mut self) -> &mut PluginSlots<Self>;
}

/// Resolve (or reuse) `name` for `owner` and run it with `args`.
///
/// A plugin may run other plugins on its owner, but not itself: a nested call
/// for a name that is still running fails with [`Error::Plugin`].
pub async fn dispatch<O: PluginHost>(owner: &mut O, name: &str, args: &[Value]) -> Result<(), Error> {
    let key = canonical_name(name);
    if owner.slots().running.contains(&key) {
        return Err(Error::Plugin(format!("{} is already running", key)));
    }
    let cached = owner.slots().live.remove(&key);
    let mut plugin = match cached {
        Some(plugin) => plugin,
        None => owner.registry().instantiate::<O>(&key, &*owner)?,
    };
    owner.slots().running.insert(key.clone());
    let outcome = plugin.run(owner, args).await;
    let slots = owner.slots();
    slots.running.remove(&key);
    slots.live.insert(key, plugin);
    outcome
}
