// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! Storage collaborators fail transiently (pool exhaustion, failover, a Redis
//! restart). Operations retry with backoff; permanent errors such as a
//! corrupt root record are surfaced immediately through [`retry_if`].
//!
//! # Example
//!
//! ```
//! use provenance_registry::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! let query = RetryConfig::query();
//! assert_eq!(query.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Backoff policy.
///
/// - [`RetryConfig::startup()`]: connection attempts while the registry boots
/// - [`RetryConfig::query()`]: leaf reads, root reads and publishes
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts before giving up; `None` keeps trying
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Five attempts over a few seconds, so a wrong URL fails startup quickly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_retries: Some(5),
        }
    }

    /// Three attempts; a rebuild that still fails is reported to the caller
    /// and the previous root stays published.
    #[must_use]
    pub fn query() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_retries: Some(3),
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
            max_retries: Some(3),
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor).min(self.max_delay)
    }

    fn exhausted(&self, attempts: usize) -> bool {
        self.max_retries.is_some_and(|max| attempts >= max)
    }
}

/// Retry every error until `config` is exhausted.
pub async fn retry<F, Fut, T, E>(name: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(name, config, operation, |_| true).await
}

/// Retry only the errors `should_retry` accepts; anything else returns at once.
pub async fn retry_if<F, Fut, T, E, P>(
    name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0usize;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempts > 0 {
                    info!(operation = name, retries = attempts, "Operation recovered");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        attempts += 1;
        if !should_retry(&err) || config.exhausted(attempts) {
            return Err(err);
        }

        warn!(
            operation = name,
            attempt = attempts,
            max = ?config.max_retries,
            error = %err,
            ?delay,
            "Operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
