//! External collaborators of a boundary: error reporting and hard reloads.

use sitekit_core::RuntimeMode;

use crate::boundary::{CapturedError, FailureOrigin};

/// Diagnostic context passed along with a captured error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Name of the boundary that intercepted the failure.
    pub boundary: String,
    /// How the failure surfaced.
    pub origin: FailureOrigin,
    pub mode: RuntimeMode,
}

/// Receives errors intercepted by a boundary.
pub trait ErrorReporter {
    fn report(&self, error: &CapturedError, context: &ErrorContext);
}

impl<F> ErrorReporter for F
where
    F: Fn(&CapturedError, &ErrorContext),
{
    fn report(&self, error: &CapturedError, context: &ErrorContext) {
        self(error, context)
    }
}

/// Reports intercepted errors through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &CapturedError, context: &ErrorContext) {
        tracing::error!(
            boundary = %context.boundary,
            origin = ?context.origin,
            details = error.details.as_deref().unwrap_or(""),
            "error boundary caught an error: {}",
            error.message
        );
    }
}

/// Restarts the application from its initial load, discarding in-memory state.
pub trait Reloader {
    fn restart_application(&self);
}

impl<F> Reloader for F
where
    F: Fn(),
{
    fn restart_application(&self) {
        self()
    }
}

/// Reloader for hosts without a restart primitive; only logs the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReloader;

impl Reloader for LoggingReloader {
    fn restart_application(&self) {
        tracing::warn!("application restart requested but no reloader is installed");
    }
}
