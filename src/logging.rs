//! Log output for the CLI and library hosts
//!
//! Retention decisions are emitted at `debug` and cycle summaries at `info`,
//! so `verbose` only moves the default filter. `RUST_LOG` takes precedence.

use tracing_subscriber::EnvFilter;

/// Filter for `verbose`, unless `RUST_LOG` is set. For hosts that build
/// their own subscriber.
pub fn filter(verbose: bool) -> EnvFilter {
    let default = if verbose {
        "build_keeper=debug,warn"
    } else {
        "build_keeper=info,warn"
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_follows_verbose() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(filter(true).to_string().contains("build_keeper=debug"));
        assert!(filter(false).to_string().contains("build_keeper=info"));
    }
}
