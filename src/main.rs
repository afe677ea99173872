//! ksr CLI - Keystone discovery, settings and token sessions.

use std::path::Path;
use std::process;

use clap::Parser;
use keystone_resolver::cli::{Cli, Commands, ConfigCommands};
use keystone_resolver::commands::{self, Output};
use keystone_resolver::config::{self, ConfigOverrides, OutputFormat};
use keystone_resolver::logging;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut human = cli.human_readable;
    let result = config::config_dir(cli.config_dir.as_deref()).and_then(|dir| {
        let overrides = overrides_for(&cli.command, cli.human_readable);
        let resolved = config::resolve_config(&dir, &overrides)?;
        human = resolved.output_format() == OutputFormat::Human;
        run_command(cli.command, &dir, resolved, human)
    });

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

/// CLI flags that take precedence over config.kdl.
fn overrides_for(command: &Commands, human: bool) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if human {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    match command {
        Commands::Resolve {
            instance: Some(instance),
            ..
        }
        | Commands::Settings {
            instance: Some(instance),
            ..
        } => {
            overrides = overrides.with_default_instance(instance.clone());
        }
        Commands::Token(args) => {
            if let Some(attempts) = args.retry_attempts {
                overrides = overrides.with_retry_attempts(attempts);
            }
            if let Some(delay) = args.retry_delay {
                overrides = overrides.with_retry_delay_secs(delay);
            }
            if let Some(timeout) = args.timeout {
                overrides = overrides.with_timeout_secs(timeout);
            }
        }
        _ => {}
    }
    overrides
}

fn run_command(
    command: Commands,
    config_dir: &Path,
    config: config::ResolvedConfig,
    human: bool,
) -> Result<(), keystone_resolver::Error> {
    match command {
        Commands::Resolve { fleet, .. } => {
            let result = commands::resolve(&fleet, &config)?;
            output(&result, human);
        }

        Commands::Settings { fleet, cookbook, .. } => {
            let result = commands::settings(&fleet, cookbook.as_deref(), &config)?;
            output(&result, human);
        }

        Commands::Profiler { fleet, cookbook } => {
            let result = commands::profiler(&fleet, &cookbook)?;
            output(&result, human);
        }

        Commands::Token(args) => {
            let result = commands::token(&args, &config)?;
            output(&result, human);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(config_dir, config);
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(config_dir, &key, &value)?;
                output(&result, human);
            }
            ConfigCommands::Path => {
                let result = commands::config_path(config_dir);
                output(&result, human);
            }
        },
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
