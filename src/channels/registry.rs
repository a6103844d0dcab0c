//! Channel registry and the catalog of known channel kinds.
//!
//! The registry is an immutable snapshot built once at startup. Dispatch
//! loops share it through an `Arc`; adding a channel requires a restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::channels::stdio::StdioChannel;
use crate::error::ConfigError;

type ChannelFactory = Box<dyn Fn() -> Arc<dyn Channel> + Send + Sync>;

/// Immutable set of configured channels, keyed by name.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    /// Build a registry from already-constructed channels.
    ///
    /// A later channel with the same name replaces an earlier one.
    pub fn from_channels(channels: impl IntoIterator<Item = Arc<dyn Channel>>) -> Self {
        let channels = channels
            .into_iter()
            .map(|ch| (ch.name().to_string(), ch))
            .collect();
        Self { channels }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Channels paired with their configured names, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Channel>)> {
        self.channels.iter().map(|(name, ch)| (name.as_str(), ch))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.names())
            .finish()
    }
}

/// Known channel kinds and how to construct them.
pub struct ChannelCatalog {
    factories: BTreeMap<String, ChannelFactory>,
}

impl ChannelCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The catalog of channels shipped with the bridge.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("stdio", || Arc::new(StdioChannel::new()) as Arc<dyn Channel>);
        catalog
    }

    /// Register a channel kind under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Channel> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Names of all known channel kinds, sorted.
    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate the named channels.
    ///
    /// Fails on the first unknown name; the caller treats this as fatal.
    pub fn build_registry(&self, names: &[String]) -> Result<ChannelRegistry, ConfigError> {
        let mut channels = BTreeMap::new();
        for name in names {
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| ConfigError::UnknownChannel {
                    name: name.clone(),
                    available: self.available().join(", "),
                })?;
            channels.insert(name.clone(), factory());
        }
        Ok(ChannelRegistry { channels })
    }
}

impl Default for ChannelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
