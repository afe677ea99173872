//! Read-only attribute trees.
//!
//! A [`ConfigTree`] is the nested key/value document attached to every fleet
//! node. Lookups take dotted paths (`"keystone.api.protocol"`); nothing in the
//! crate writes back into a tree.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Nested, read-only attribute document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    /// Wrap an attribute document. Non-object roots are treated as empty.
    pub fn new(root: Value) -> Self {
        let root = if root.is_object() {
            root
        } else {
            Value::Object(Default::default())
        };
        Self { root }
    }

    /// The whole document.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |value, segment| value.get(segment))
    }

    /// Look up a string value.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Look up a boolean value. Missing keys read as `false`.
    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether a key exists at `path` (even if its value is null).
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Whether `path` holds a list containing `item`.
    pub fn list_contains(&self, path: &str, item: &str) -> bool {
        self.get(path)
            .and_then(Value::as_array)
            .is_some_and(|items| items.iter().any(|v| v.as_str() == Some(item)))
    }

    /// Deserialize the subtree at `path` into a typed schema.
    ///
    /// Returns `Ok(None)` when the path is absent.
    pub fn subtree<T: DeserializeOwned>(&self, path: &str) -> serde_json::Result<Option<T>> {
        match self.get(path) {
            Some(value) => serde_json::from_value(value.clone()).map(Some),
            None => Ok(None),
        }
    }
}

impl From<Value> for ConfigTree {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
