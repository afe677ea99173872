//! Typed view of the Keystone attributes on a node.
//!
//! The `keystone` subtree is parsed once, when a bundle is built, and
//! validated there; everything downstream works with plain fields.
//!
//! # Attribute layout
//!
//! ```json
//! {
//!   "keystone": {
//!     "api": {
//!       "protocol": "https",
//!       "version": "3",
//!       "service_port": 5000,
//!       "admin_port": 35357,
//!       "region": "RegionOne"
//!     },
//!     "ha": { "enabled": false },
//!     "ssl": { "insecure": false },
//!     "service": { "token": "...", "project": "service" },
//!     "admin": { "project": "admin", "username": "admin", "password": "..." },
//!     "default": {
//!       "create_user": true,
//!       "project": "openstack",
//!       "username": "crowbar",
//!       "password": "..."
//!     },
//!     "federation": {
//!       "openidc": { "enabled": false },
//!       "trusted_dashboards": [],
//!       "websso_keystone_url": ""
//!     },
//!     "osprofiler": { ... }
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::fleet::Node;
use crate::{Error, Result};

/// URL scheme of the identity API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::Https)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// API version as configured: a number (`3`, `3.0`) or a string (`"3"`, `"v3"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct ApiVersion {
    raw: Value,
    number: f64,
}

impl TryFrom<Value> for ApiVersion {
    type Error = String;

    fn try_from(raw: Value) -> std::result::Result<Self, Self::Error> {
        let number = match &raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim_start_matches('v').parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(number) => Ok(Self { raw, number }),
            None => Err(format!("unsupported api version {}", raw)),
        }
    }
}

impl ApiVersion {
    /// The value exactly as configured.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Textual form as configured (`3`, `3.0`, `v3`).
    pub fn text(&self) -> String {
        match &self.raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Numeric value, ignoring any `v` prefix.
    pub fn number(&self) -> f64 {
        self.number
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAttributes {
    pub protocol: Protocol,
    pub version: ApiVersion,
    pub service_port: u16,
    pub admin_port: u16,
    #[serde(default)]
    pub region: Option<String>,
}

/// `{ "enabled": bool }` blocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Toggle {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslAttributes {
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAttributes {
    #[serde(default)]
    pub token: Option<String>,
    pub project: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminAttributes {
    pub project: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultUserAttributes {
    #[serde(default)]
    pub create_user: bool,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederationAttributes {
    #[serde(default)]
    pub openidc: Toggle,
    #[serde(default)]
    pub trusted_dashboards: Vec<String>,
    #[serde(default)]
    pub websso_keystone_url: String,
}

/// The `keystone` attribute subtree.
#[derive(Debug, Clone, Deserialize)]
pub struct KeystoneAttributes {
    pub api: ApiAttributes,
    #[serde(default)]
    pub ha: Toggle,
    #[serde(default)]
    pub ssl: SslAttributes,
    pub service: ServiceAttributes,
    pub admin: AdminAttributes,
    #[serde(default)]
    pub default: DefaultUserAttributes,
    #[serde(default)]
    pub federation: FederationAttributes,
    #[serde(default)]
    pub osprofiler: Value,
}

impl KeystoneAttributes {
    /// Parse and validate the `keystone` subtree of `node`.
    pub fn from_node(node: &Node) -> Result<Self> {
        let attrs: Self = node
            .attributes()
            .subtree("keystone")
            .map_err(|e| Error::InvalidAttribute {
                node: node.name().to_string(),
                message: format!("keystone: {}", e),
            })?
            .ok_or_else(|| Error::MissingAttribute {
                node: node.name().to_string(),
                path: "keystone".to_string(),
            })?;
        attrs.validate().map_err(|message| Error::InvalidAttribute {
            node: node.name().to_string(),
            message,
        })?;
        Ok(attrs)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.api.service_port == 0 || self.api.admin_port == 0 {
            return Err("keystone.api ports must be non-zero".to_string());
        }
        if self.default.create_user && self.default.username.is_none() {
            return Err("keystone.default.username is required when create_user is set".to_string());
        }
        Ok(())
    }

    pub fn use_ssl(&self) -> bool {
        self.api.protocol.is_secure()
    }

    /// Default-user credentials, present only when the user is created.
    pub fn default_user(&self) -> Option<DefaultUser> {
        if !self.default.create_user {
            return None;
        }
        Some(DefaultUser {
            username: self.default.username.clone()?,
            password: self.default.password.clone(),
        })
    }
}

/// Credentials of the default (non-admin) user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultUser {
    pub username: String,
    pub password: Option<String>,
}

/// The `horizon` subtree of a dashboard node, as far as URLs are concerned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HorizonAttributes {
    #[serde(default)]
    pub ha: Toggle,
    #[serde(default)]
    pub apache: Option<ApacheAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApacheAttributes {
    #[serde(default)]
    pub ssl: bool,
}
