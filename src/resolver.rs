//! Locating the node that hosts a Keystone instance.
//!
//! Resolution results are cached per [`InstanceKey`] inside an [`EpochCache`].
//! The cache lives for one resolution epoch: presenting a different
//! [`Generation`] drops every cached instance before anything is looked up.

use std::collections::HashMap;
use std::fmt;

use tracing::info;

use crate::fleet::{FleetSearch, NodeHandle, NodeQuery};

/// Instance label used when a cookbook does not name one.
pub const DEFAULT_INSTANCE: &str = "default";

/// Role carried by nodes that run Keystone.
pub const KEYSTONE_ROLE: &str = "keystone-server";

/// Attribute naming the config environment a Keystone node belongs to.
pub const CONFIG_ENVIRONMENT_ATTR: &str = "keystone.config_environment";

/// Node state that takes a node out of service discovery.
pub const UPGRADE_STATE: &str = "crowbar_upgrade";

/// Label of one logical Keystone deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Config environment value carried by nodes of this instance.
    pub fn config_environment(&self) -> String {
        format!("keystone-config-{}", self.0)
    }
}

impl Default for InstanceKey {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceKey {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Opaque marker of a resolution epoch.
///
/// Only equality matters: a marker that differs from the last one seen
/// invalidates all cached state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation(String);

impl Generation {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Marker for the current instant, for one-shot invocations.
    pub fn now() -> Self {
        Self(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Generation {
    fn from(marker: &str) -> Self {
        Self::new(marker)
    }
}

impl From<i64> for Generation {
    fn from(marker: i64) -> Self {
        Self(marker.to_string())
    }
}

impl From<f64> for Generation {
    fn from(marker: f64) -> Self {
        Self(marker.to_string())
    }
}

/// Per-instance cache scoped to one generation.
#[derive(Debug)]
pub struct EpochCache<V> {
    generation: Option<Generation>,
    entries: HashMap<InstanceKey, V>,
}

impl<V> Default for EpochCache<V> {
    fn default() -> Self {
        Self {
            generation: None,
            entries: HashMap::new(),
        }
    }
}

impl<V> EpochCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the cache to `generation`.
    ///
    /// Returns `true` when the generation changed; all entries are dropped in
    /// that case.
    pub fn advance(&mut self, generation: &Generation) -> bool {
        if self.generation.as_ref() == Some(generation) {
            return false;
        }
        self.entries.clear();
        self.generation = Some(generation.clone());
        true
    }

    pub fn generation(&self) -> Option<&Generation> {
        self.generation.as_ref()
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: InstanceKey, value: V) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Search query for the Keystone node of `instance`.
pub fn keystone_query(instance: &InstanceKey) -> NodeQuery {
    NodeQuery::new()
        .with_role(KEYSTONE_ROLE)
        .with_attribute(CONFIG_ENVIRONMENT_ATTR, instance.config_environment())
        .without_attribute("state", UPGRADE_STATE)
}

/// Finds and caches the node hosting each Keystone instance.
#[derive(Debug)]
pub struct InstanceResolver<S> {
    search: S,
    cache: EpochCache<NodeHandle>,
}

impl<S: FleetSearch> InstanceResolver<S> {
    pub fn new(search: S) -> Self {
        Self {
            search,
            cache: EpochCache::new(),
        }
    }

    /// The fleet this resolver searches.
    pub fn search(&self) -> &S {
        &self.search
    }

    /// Resolve the node hosting `instance` on behalf of `local`.
    ///
    /// When the search finds nothing, or finds `local` itself first, `local`
    /// is the answer.
    pub fn resolve(
        &mut self,
        local: &NodeHandle,
        instance: &InstanceKey,
        generation: &Generation,
    ) -> NodeHandle {
        self.cache.advance(generation);

        if let Some(node) = self.cache.get(instance) {
            info!("Keystone server found at {} [cached]", node.name());
            return node.clone();
        }

        let query = keystone_query(instance);
        let node = match self.search.find(&query).into_iter().next() {
            Some(first) if first.name() != local.name() => first,
            _ => local.clone(),
        };

        self.cache.insert(instance.clone(), node.clone());
        info!("Keystone server found at {}", node.name());
        node
    }

    /// Drop every cached resolution regardless of generation.
    pub fn invalidate(&mut self) {
        self.cache = EpochCache::new();
    }
}
