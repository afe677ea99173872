//! KDL schema for the client's config.kdl.
//!
//! ```kdl
//! retry-attempts 10
//! retry-delay-secs 5
//! timeout-secs 30
//! default-instance "default"
//! output-format "human"  // or "json"
//! ```

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client preferences. Unset keys fall through to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Attempts per identity API request, including the first
    pub retry_attempts: Option<u32>,

    /// Pause between attempts
    pub retry_delay_secs: Option<u64>,

    /// Connect/read timeout for identity API requests
    pub timeout_secs: Option<u64>,

    /// Instance label used by `resolve` when none is given
    pub default_instance: Option<String>,

    pub output_format: Option<OutputFormat>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_attempts == Some(0) {
            return Err("retry-attempts must be at least 1".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout-secs must be at least 1".to_string());
        }
        if let Some(ref instance) = self.default_instance {
            if instance.trim().is_empty() {
                return Err("default-instance must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes and ill-typed values
    /// are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(i) = first_integer(doc, "retry-attempts") {
            config.retry_attempts = u32::try_from(i).ok();
        }
        if let Some(i) = first_integer(doc, "retry-delay-secs") {
            config.retry_delay_secs = u64::try_from(i).ok();
        }
        if let Some(i) = first_integer(doc, "timeout-secs") {
            config.timeout_secs = u64::try_from(i).ok();
        }
        if let Some(s) = first_string(doc, "default-instance") {
            config.default_instance = Some(s.to_string());
        }
        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(attempts) = self.retry_attempts {
            push_node(&mut doc, "retry-attempts", KdlValue::Integer(attempts as i128));
        }
        if let Some(delay) = self.retry_delay_secs {
            push_node(&mut doc, "retry-delay-secs", KdlValue::Integer(delay as i128));
        }
        if let Some(timeout) = self.timeout_secs {
            push_node(&mut doc, "timeout-secs", KdlValue::Integer(timeout as i128));
        }
        if let Some(ref instance) = self.default_instance {
            push_node(&mut doc, "default-instance", KdlValue::String(instance.clone()));
        }
        if let Some(format) = self.output_format {
            push_node(
                &mut doc,
                "output-format",
                KdlValue::String(format.as_str().to_string()),
            );
        }

        doc
    }
}

fn first_string<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    doc.get(name)?.entries().first()?.value().as_string()
}

fn first_integer(doc: &KdlDocument, name: &str) -> Option<i128> {
    doc.get(name)?.entries().first()?.value().as_integer()
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}
