use tracing::error;

use crate::error::ApiError;

/// Destination for failures that should not happen in normal operation.
///
/// Expected outcomes (an unauthenticated probe, a missing refresh credential)
/// never reach the reporter.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, operation: &'static str, error: &ApiError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, operation: &'static str, err: &ApiError) {
        error!(
            operation,
            status = err.status().map(|status| status.as_u16()),
            "unexpected session failure: {err}"
        );
    }
}
