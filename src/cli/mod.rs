//! CLI argument definitions for ksr.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::settings::schema::Protocol;

/// Version string with build metadata.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("KSR_GIT_COMMIT"),
    " ",
    env!("KSR_BUILD_TIMESTAMP"),
    ")"
);

/// ksr - Keystone service discovery, settings derivation and token sessions.
///
/// Point `resolve` or `settings` at a fleet snapshot (JSON or TOML) to see
/// which node hosts Keystone for a consumer and what it should use.
#[derive(Parser, Debug)]
#[command(name = "ksr")]
#[command(
    author,
    version,
    long_version = LONG_VERSION,
    about = "Keystone discovery and session client",
    long_about = None
)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Directory holding config.kdl.
    /// Can also be set via KSR_CONFIG_DIR environment variable.
    #[arg(long = "config-dir", global = true, env = "KSR_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Fleet snapshot and local node selection, shared by discovery commands.
#[derive(clap::Args, Debug, Clone)]
pub struct FleetArgs {
    /// Fleet snapshot file (.json or .toml)
    #[arg(long, short = 'f')]
    pub fleet: PathBuf,

    /// Name of the node asking (the local node)
    #[arg(long, short = 'n')]
    pub node: String,

    /// Generation marker; defaults to the current time
    #[arg(long, short = 'g')]
    pub generation: Option<String>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find the node hosting a Keystone instance
    Resolve {
        #[command(flatten)]
        fleet: FleetArgs,

        /// Instance label (defaults to config default-instance)
        #[arg(long, short = 'i')]
        instance: Option<String>,
    },

    /// Derive the Keystone settings bundle for a consumer
    ///
    /// With --cookbook, the instance and service account come from the local
    /// node's `<cookbook>.keystone_instance`, `.service_user` and
    /// `.service_password` attributes.
    Settings {
        #[command(flatten)]
        fleet: FleetArgs,

        /// Consumer cookbook name
        #[arg(long, short = 'c')]
        cookbook: Option<String>,

        /// Instance label, when no cookbook is given
        #[arg(long, short = 'i', conflicts_with = "cookbook")]
        instance: Option<String>,
    },

    /// Show the profiler attributes of the resolved Keystone node
    Profiler {
        #[command(flatten)]
        fleet: FleetArgs,

        /// Consumer cookbook name
        #[arg(long, short = 'c')]
        cookbook: String,
    },

    /// Obtain (and optionally revoke) a token from the identity API
    Token(TokenArgs),

    /// Client configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments for `ksr token`.
#[derive(clap::Args, Debug, Clone)]
pub struct TokenArgs {
    /// Identity API host
    #[arg(long)]
    pub host: String,

    /// Identity API port
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    #[arg(long, value_enum, default_value_t = ProtocolArg::Http)]
    pub protocol: ProtocolArg,

    #[arg(long, short = 'u')]
    pub user: String,

    /// Password (prefer the environment variable)
    #[arg(long, short = 'p', env = "KSR_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Scope the token to this project
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub user_domain: Option<String>,

    #[arg(long)]
    pub project_domain: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Revoke the token right after obtaining it
    #[arg(long)]
    pub revoke: bool,

    /// Attempts per request (overrides config)
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Seconds between attempts (overrides config)
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Connect/read timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Protocol choices for the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolArg {
    Http,
    Https,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Http => Protocol::Http,
            ProtocolArg::Https => Protocol::Https,
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved configuration values and where they came from
    Show,

    /// Set a configuration value in config.kdl
    Set {
        /// Configuration key (e.g. retry-attempts)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the config.kdl path
    Path,
}
