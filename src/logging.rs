//! Tracing subscriber setup for the `ksr` binary.
//!
//! Logs go to stderr so stdout stays clean for command output. `RUST_LOG`
//! wins when set; otherwise the crate logs at `info`, or `debug` with
//! `--verbose`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default directive when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "keystone_resolver=debug"
    } else {
        "keystone_resolver=info"
    }
}

/// Build the filter from `RUST_LOG`, falling back to [`default_directive`].
pub fn env_filter(verbose: bool) -> EnvFilter {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default_directive(verbose)),
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "keystone_resolver=info");
        assert_eq!(default_directive(true), "keystone_resolver=debug");
    }

    #[test]
    #[serial]
    fn test_env_filter_prefers_rust_log() {
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var("RUST_LOG", "keystone_resolver=trace") };
        assert_eq!(env_filter(false).to_string(), "keystone_resolver=trace");
        unsafe { std::env::remove_var("RUST_LOG") };
        assert_eq!(env_filter(true).to_string(), "keystone_resolver=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
