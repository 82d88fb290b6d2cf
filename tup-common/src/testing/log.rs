//! Test logging.
//!
//! Call [`init_test_logging`] at the top of a test (or from a `#[ctor::ctor]`
//! hook) to route `tracing` output through the libtest capture writer.
//!
//! - `TUP_TEST_LOG_LEVEL`: filter directive (default: `info`)
//! - `TUP_TEST_LOG_JSON=1`: emit one JSON object per event

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter directive for test runs.
pub fn test_log_level() -> String {
    std::env::var("TUP_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Install the test subscriber. Safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(test_log_level()).unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("TUP_TEST_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

        let builder = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .with_target(true);

        // Another harness may have installed a global subscriber already.
        let _ = if json {
            builder.json().with_current_span(true).try_init()
        } else {
            builder.try_init()
        };
    });
}

/// Log a test-scoped message under the `test` target.
#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        tracing::info!(target: "test", $($arg)*)
    };
}
