//! Retry policies for fetch operations.

use std::time::Duration;

use sitekit_core::QueryDefaults;

use crate::error::{ErrorClass, FetchError};

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                std::cmp::min(base.saturating_mul(multiplier), *max)
            }
        }
    }
}

/// Retry policy configuration.
///
/// Client errors are never retried. Every other failure is retried until
/// `max_retries` additional attempts have been made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Create a new retry policy with immediate retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::None,
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Build from configured query defaults.
    pub fn from_defaults(defaults: &QueryDefaults) -> Self {
        Self::new(defaults.max_retries)
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Decide whether to retry after a failure.
    ///
    /// `failures_so_far` counts the failures before this one, so the first
    /// failure is passed as `0`.
    pub fn should_retry(&self, failures_so_far: u32, error: &FetchError) -> bool {
        if error.class() == ErrorClass::ClientError {
            return false;
        }
        failures_so_far < self.max_retries
    }

    /// Maximum number of attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
