//! Fleet registry and node search.
//!
//! The [`Fleet`] owns every known node; callers receive cheap [`NodeHandle`]
//! clones. Searches are expressed as a [`NodeQuery`] (role membership, exact
//! attribute matches, exclusions) and return nodes in registration order.
//!
//! Fleet snapshots can be loaded from JSON or TOML:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "name": "d52-54-00-01.example.com", "attributes": { "roles": ["keystone-server"] } }
//!   ]
//! }
//! ```

pub mod hosts;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::tree::ConfigTree;
use crate::{Error, Result};

pub use hosts::{CrowbarHosts, HostLookup};

/// One fleet member: display name plus attribute tree.
#[derive(Debug, PartialEq)]
pub struct Node {
    name: String,
    attributes: ConfigTree,
}

/// Shared reference to a fleet member.
pub type NodeHandle = Arc<Node>;

impl Node {
    /// Create a node handle.
    pub fn new(name: impl Into<String>, attributes: ConfigTree) -> NodeHandle {
        Arc::new(Self {
            name: name.into(),
            attributes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &ConfigTree {
        &self.attributes
    }

    /// Roles are the `roles` list in the attribute tree.
    pub fn has_role(&self, role: &str) -> bool {
        self.attributes.list_contains("roles", role)
    }

    /// Required string attribute.
    pub fn require_str(&self, path: &str) -> Result<&str> {
        self.attributes
            .get_str(path)
            .ok_or_else(|| Error::MissingAttribute {
                node: self.name.clone(),
                path: path.to_string(),
            })
    }
}

/// An exact-match condition on a string attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatch {
    /// Dotted path into the attribute tree
    pub path: String,
    /// Expected string value
    pub value: String,
}

impl AttributeMatch {
    fn matches(&self, node: &Node) -> bool {
        node.attributes.get_str(&self.path) == Some(self.value.as_str())
    }
}

impl fmt::Display for AttributeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.replace('.', "_"), self.value)
    }
}

/// Conjunctive node predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    /// Required role, if any
    pub role: Option<String>,
    /// Attributes that must match
    pub equals: Vec<AttributeMatch>,
    /// Attributes that must not match
    pub excludes: Vec<AttributeMatch>,
}

impl NodeQuery {
    /// Create an empty query (matches every node).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Require an attribute to equal a value.
    pub fn with_attribute(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push(AttributeMatch {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Exclude nodes whose attribute equals a value.
    pub fn without_attribute(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.excludes.push(AttributeMatch {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Evaluate the predicate against one node.
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(ref role) = self.role {
            if !node.has_role(role) {
                return false;
            }
        }
        self.equals.iter().all(|m| m.matches(node))
            && !self.excludes.iter().any(|m| m.matches(node))
    }
}

impl fmt::Display for NodeQuery {
    /// Renders in search-index syntax, e.g. `roles:keystone-server AND
    /// keystone_config_environment:keystone-config-default AND NOT state:crowbar_upgrade`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::new();
        if let Some(ref role) = self.role {
            terms.push(format!("roles:{}", role));
        }
        terms.extend(self.equals.iter().map(|m| m.to_string()));
        terms.extend(self.excludes.iter().map(|m| format!("NOT {}", m)));
        if terms.is_empty() {
            write!(f, "*:*")
        } else {
            write!(f, "{}", terms.join(" AND "))
        }
    }
}

/// Node search over a fleet.
pub trait FleetSearch {
    /// Return all nodes matching `query`. Order is the registry's order and
    /// carries no further guarantee.
    fn find(&self, query: &NodeQuery) -> Vec<NodeHandle>;
}

impl<T: FleetSearch + ?Sized> FleetSearch for &T {
    fn find(&self, query: &NodeQuery) -> Vec<NodeHandle> {
        (**self).find(query)
    }
}

/// In-memory fleet registry.
#[derive(Debug, Default)]
pub struct Fleet {
    nodes: Vec<NodeHandle>,
}

#[derive(Debug, Deserialize)]
struct FleetFile {
    #[serde(default)]
    nodes: Vec<FleetFileNode>,
}

#[derive(Debug, Deserialize)]
struct FleetFileNode {
    name: String,
    #[serde(default)]
    attributes: Value,
}

impl Fleet {
    /// Create an empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. A node with the same name replaces the earlier entry in place.
    pub fn register(&mut self, node: NodeHandle) {
        match self.nodes.iter_mut().find(|n| n.name() == node.name()) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    /// Look up a node by name.
    pub fn get(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|n| n.name() == name).cloned()
    }

    /// Look up a node by name, failing if absent.
    pub fn require(&self, name: &str) -> Result<NodeHandle> {
        self.get(name).ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Load a fleet snapshot. `.toml` files are parsed as TOML, everything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed: std::result::Result<FleetFile, String> = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };
        let file = parsed.map_err(|message| Error::Parse {
            path: path.display().to_string(),
            message,
        })?;

        let mut fleet = Self::new();
        for entry in file.nodes {
            fleet.register(Node::new(entry.name, ConfigTree::new(entry.attributes)));
        }
        Ok(fleet)
    }
}

impl FleetSearch for Fleet {
    fn find(&self, query: &NodeQuery) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .filter(|node| query.matches(node))
            .cloned()
            .collect()
    }
}
