//! Diagnostic logging to stderr. Progress output for the operator stays on
//! stdout and does not go through here.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "GSC_COMPARE_LOG";
const DEFAULT_DIRECTIVES: &str = "warn";

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    let directives = filter_directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// First non-blank of the crate variable, then `RUST_LOG`, then `warn`.
fn filter_directives(own: Option<String>, rust_log: Option<String>) -> String {
    [own, rust_log]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_variable_wins() {
        assert_eq!(
            filter_directives(Some("gsc_compare=debug".into()), Some("info".into())),
            "gsc_compare=debug"
        );
    }

    #[test]
    fn falls_back_to_rust_log_then_warn() {
        assert_eq!(filter_directives(Some("  ".into()), Some("info".into())), "info");
        assert_eq!(filter_directives(None, None), "warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init();
        init();
    }
}
