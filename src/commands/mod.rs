//! Command implementations for the ksr CLI.
//!
//! Each command returns a result type implementing [`Output`]; the binary
//! decides between JSON and human-readable rendering.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::cli::{FleetArgs, TokenArgs};
use crate::config::{self, ClientConfig, OutputFormat, ResolvedConfig, ValueSource};
use crate::fleet::{Fleet, NodeHandle};
use crate::resolver::{Generation, InstanceKey, InstanceResolver, keystone_query};
use crate::session::{AuthSession, Credentials, Endpoint};
use crate::settings::{ServiceAccount, Settings, SettingsBuilder, cookbook_instance};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_of<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Load the fleet snapshot and pick out the local node.
fn load_fleet(args: &FleetArgs) -> Result<(Fleet, NodeHandle)> {
    let fleet = Fleet::load(&args.fleet)?;
    let local = fleet.require(&args.node)?;
    Ok((fleet, local))
}

fn generation_of(args: &FleetArgs) -> Generation {
    match args.generation {
        Some(ref marker) => Generation::new(marker.clone()),
        None => Generation::now(),
    }
}

// ==================== resolve ====================

#[derive(Debug, Serialize)]
pub struct ResolveResult {
    pub instance: String,
    pub instance_source: ValueSource,
    pub node: String,
    pub is_local: bool,
    pub query: String,
    pub generation: String,
}

impl Output for ResolveResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Keystone instance '{}' is served by {}", self.instance, self.node);
        if self.is_local {
            out.push_str(" (local)");
        }
        out.push_str(&format!("\n  query: {}", self.query));
        out
    }
}

/// Find the node hosting the resolved default instance (`--instance`,
/// then config.kdl, then `default`).
pub fn resolve(args: &FleetArgs, config: &ResolvedConfig) -> Result<ResolveResult> {
    let (fleet, local) = load_fleet(args)?;
    let instance = InstanceKey::new(config.default_instance());
    let generation = generation_of(args);

    let mut resolver = InstanceResolver::new(&fleet);
    let node = resolver.resolve(&local, &instance, &generation);

    Ok(ResolveResult {
        instance: instance.to_string(),
        instance_source: config.default_instance.source.clone(),
        node: node.name().to_string(),
        is_local: node.name() == local.name(),
        query: keystone_query(&instance).to_string(),
        generation: generation.to_string(),
    })
}

// ==================== settings ====================

#[derive(Debug, Serialize)]
pub struct SettingsResult {
    pub instance: String,
    #[serde(flatten)]
    pub settings: Settings,
}

impl Output for SettingsResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Keystone settings for instance '{}':", self.instance)];
        if let Ok(Value::Object(map)) = serde_json::to_value(&self.settings) {
            for (key, value) in map {
                let shown = match key.as_str() {
                    "admin_password" | "default_password" | "service_password" | "admin_token"
                        if !value.is_null() =>
                    {
                        "********".to_string()
                    }
                    _ => match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    },
                };
                lines.push(format!("  {}: {}", key, shown));
            }
        }
        lines.join("\n")
    }
}

/// Derive the settings bundle for a cookbook, or for the resolved default
/// instance when no cookbook is given.
pub fn settings(
    args: &FleetArgs,
    cookbook: Option<&str>,
    config: &ResolvedConfig,
) -> Result<SettingsResult> {
    let (fleet, local) = load_fleet(args)?;
    let generation = generation_of(args);
    let mut builder = SettingsBuilder::new(&fleet);

    let (instance, settings) = match cookbook {
        Some(cookbook) => {
            let instance = cookbook_instance(&local, cookbook);
            let settings = builder.settings_for_cookbook(&local, cookbook, &generation)?;
            (instance, settings)
        }
        None => {
            let instance = InstanceKey::new(config.default_instance());
            let settings =
                builder.settings(&local, &instance, &generation, ServiceAccount::default())?;
            (instance, settings)
        }
    };

    Ok(SettingsResult {
        instance: instance.to_string(),
        settings,
    })
}

// ==================== profiler ====================

#[derive(Debug, Serialize)]
pub struct ProfilerResult {
    pub cookbook: String,
    pub osprofiler: Value,
}

impl Output for ProfilerResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        match self.osprofiler {
            Value::Null => format!("No profiler settings for {}", self.cookbook),
            ref value => format!(
                "Profiler settings for {}:\n{}",
                self.cookbook,
                serde_json::to_string_pretty(value).unwrap_or_default()
            ),
        }
    }
}

pub fn profiler(args: &FleetArgs, cookbook: &str) -> Result<ProfilerResult> {
    let (fleet, local) = load_fleet(args)?;
    let mut builder = SettingsBuilder::new(&fleet);
    let osprofiler = builder.profiler_settings(&local, cookbook, &generation_of(args));
    Ok(ProfilerResult {
        cookbook: cookbook.to_string(),
        osprofiler,
    })
}

// ==================== token ====================

#[derive(Debug, Serialize)]
pub struct TokenResult {
    pub endpoint: String,
    pub user: String,
    pub project: Option<String>,
    pub state: String,
    pub token: Option<String>,
    pub revoke_status: Option<u16>,
}

impl Output for TokenResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Token for {} at {}: {}", self.user, self.endpoint, self.state);
        if let Some(ref token) = self.token {
            out.push_str(&format!("\n  token: {}", token));
        }
        if let Some(status) = self.revoke_status {
            out.push_str(&format!("\n  revoked (HTTP {})", status));
        }
        out
    }
}

/// Authenticate against the identity API, optionally revoking right away.
///
/// An authentication failure is reported as [`Error::Unauthenticated`] after
/// the session has logged the response details.
pub fn token(args: &TokenArgs, config: &ResolvedConfig) -> Result<TokenResult> {
    let endpoint = Endpoint::new(args.host.clone(), args.port, args.protocol.into())
        .insecure(args.insecure);

    let mut credentials = Credentials::new(args.user.clone(), args.password.clone());
    if let Some(ref project) = args.project {
        credentials = credentials.with_project(project.clone());
    }
    if let Some(ref domain) = args.user_domain {
        credentials = credentials.with_user_domain(domain.clone());
    }
    if let Some(ref domain) = args.project_domain {
        credentials = credentials.with_project_domain(domain.clone());
    }

    let mut session = AuthSession::connect(
        &credentials,
        &endpoint,
        config.retry_policy(),
        Some(config.timeout()),
    )?;
    if !session.is_authenticated() {
        return Err(Error::Unauthenticated);
    }

    let token = session.token().map(str::to_string);
    let revoke_status = if args.revoke {
        session.revoke()?.map(|response| response.status)
    } else {
        None
    };

    Ok(TokenResult {
        endpoint: endpoint.base_url(),
        user: args.user.clone(),
        project: args.project.clone(),
        state: session.state().to_string(),
        token,
        revoke_status,
    })
}

// ==================== config ====================

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub path: String,
    #[serde(flatten)]
    pub config: ResolvedConfig,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        [
            format!("Config file: {}", self.path),
            format!("  retry-attempts: {} ({})", c.retry_attempts.value, c.retry_attempts.source),
            format!(
                "  retry-delay-secs: {} ({})",
                c.retry_delay_secs.value, c.retry_delay_secs.source
            ),
            format!("  timeout-secs: {} ({})", c.timeout_secs.value, c.timeout_secs.source),
            format!(
                "  default-instance: {} ({})",
                c.default_instance.value, c.default_instance.source
            ),
            format!("  output-format: {} ({})", c.output_format.value, c.output_format.source),
        ]
        .join("\n")
    }
}

pub fn config_show(config_dir: &Path, config: ResolvedConfig) -> ConfigShowResult {
    ConfigShowResult {
        path: config::config_path(config_dir).display().to_string(),
        config,
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigSetResult {
    pub path: String,
    pub key: String,
    pub value: String,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path)
    }
}

/// Set one key in config.kdl, keeping the others.
pub fn config_set(config_dir: &Path, key: &str, value: &str) -> Result<ConfigSetResult> {
    let path = config::config_path(config_dir);
    let mut file = config::read_config(&path)?;
    apply_config_value(&mut file, key, value)?;
    file.validate().map_err(Error::InvalidInput)?;
    config::write_config(&path, &file)?;

    Ok(ConfigSetResult {
        path: path.display().to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn apply_config_value(config: &mut ClientConfig, key: &str, value: &str) -> Result<()> {
    let invalid = |expected: &str| {
        Error::InvalidInput(format!("{} expects {}, got '{}'", key, expected, value))
    };
    match key {
        "retry-attempts" => {
            config.retry_attempts = Some(value.parse().map_err(|_| invalid("an integer"))?)
        }
        "retry-delay-secs" => {
            config.retry_delay_secs = Some(value.parse().map_err(|_| invalid("an integer"))?)
        }
        "timeout-secs" => {
            config.timeout_secs = Some(value.parse().map_err(|_| invalid("an integer"))?)
        }
        "default-instance" => config.default_instance = Some(value.to_string()),
        "output-format" => {
            config.output_format =
                Some(OutputFormat::parse(value).ok_or_else(|| invalid("json or human"))?)
        }
        _ => return Err(Error::InvalidInput(format!("Unknown config key: {}", key))),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ConfigPathResult {
    pub path: String,
    pub exists: bool,
}

impl Output for ConfigPathResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        self.path.clone()
    }
}

pub fn config_path(config_dir: &Path) -> ConfigPathResult {
    let path = config::config_path(config_dir);
    ConfigPathResult {
        exists: path.exists(),
        path: path.display().to_string(),
    }
}
