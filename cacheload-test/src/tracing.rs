//! Log setup for tests.

use tracing_subscriber::EnvFilter;

/// Crates whose logs show up in test output, everything else is limited to errors.
const CRATE_NAMES: &[&str] = &["cacheload", "cacheload_test"];

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner. By default, our own crates log at
/// `TRACE` and all others only errors. A non-empty `RUST_LOG` replaces these directives. Calling
/// this more than once is fine, later calls do nothing.
///
/// # Example
///
/// ```
/// cacheload_test::tracing::init();
/// cacheload_test::tracing::init();
/// ```
pub fn init() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn env_filter() -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(default_directives()),
    }
}

fn default_directives() -> String {
    let mut directives = String::from("ERROR");
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}=TRACE"));
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_crates_trace() {
        assert_eq!(
            default_directives(),
            "ERROR,cacheload=TRACE,cacheload_test=TRACE"
        );
    }
}
