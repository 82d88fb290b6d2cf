//! Failure-reporting boundary.
//!
//! Recoverable failures (a tenant that could not be updated, a cluster runner
//! that hit a store error) are handed to a [`FailureReporter`] together with
//! key/value context. The default sink writes structured `tracing` events;
//! an incident tracker can be plugged in by implementing the trait.

use std::error::Error;
use tracing::error;

/// Key/value context attached to a report, e.g. `("tenant_id", "t-42")`.
pub type ReportFields<'a> = &'a [(&'a str, &'a str)];

pub trait FailureReporter: Send + Sync {
    fn report(&self, message: &str, err: &dyn Error, fields: ReportFields<'_>);
}

/// Reports failures as `error!` events, tagged with the updater commit.
#[derive(Debug, Clone)]
pub struct TracingReporter {
    commit: String,
}

impl TracingReporter {
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
        }
    }
}

impl FailureReporter for TracingReporter {
    fn report(&self, message: &str, err: &dyn Error, fields: ReportFields<'_>) {
        error!(
            commit = %self.commit,
            error = %err,
            cause = ?err.source().map(ToString::to_string),
            context = %format_fields(fields),
            "{message}"
        );
    }
}

fn format_fields(fields: ReportFields<'_>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}
