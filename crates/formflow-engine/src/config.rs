// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine configuration.

use std::env;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Arm a deadline timer for submissions that do not override it (default: false)
    pub timeout_enabled: bool,
    /// Deadline in seconds when the timer is armed (default: 90)
    pub timeout_secs: u64,
    /// Iteration cap for loops without their own cap (default: 1_000)
    pub max_loop_iterations: u32,
    /// Show a notification when a submission is aborted (default: false)
    pub notify_on_abort: bool,
    /// Delay between retries when a retry strategy does not set one (default: 1_000)
    pub default_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_enabled: false,
            timeout_secs: 90,
            max_loop_iterations: 1_000,
            notify_on_abort: false,
            default_retry_delay_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `FORMFLOW_TIMEOUT_ENABLED` - Arm submission timeouts (default: false)
    /// - `FORMFLOW_TIMEOUT_SECS` - Timeout threshold in seconds (default: 90)
    /// - `FORMFLOW_MAX_LOOP_ITERATIONS` - Loop iteration cap (default: 1000)
    /// - `FORMFLOW_NOTIFY_ON_ABORT` - Notify on aborted submissions (default: false)
    /// - `FORMFLOW_DEFAULT_RETRY_DELAY_MS` - Retry delay (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timeout_enabled = env_flag("FORMFLOW_TIMEOUT_ENABLED", defaults.timeout_enabled);
        let notify_on_abort = env_flag("FORMFLOW_NOTIFY_ON_ABORT", defaults.notify_on_abort);

        let timeout_secs: u64 = env_parse("FORMFLOW_TIMEOUT_SECS", defaults.timeout_secs)
            .map_err(|_| {
                ConfigError::Invalid("FORMFLOW_TIMEOUT_SECS", "must be a non-negative integer")
            })?;

        let max_loop_iterations: u32 =
            env_parse("FORMFLOW_MAX_LOOP_ITERATIONS", defaults.max_loop_iterations).map_err(
                |_| ConfigError::Invalid("FORMFLOW_MAX_LOOP_ITERATIONS", "must be a positive integer"),
            )?;
        if max_loop_iterations == 0 {
            return Err(ConfigError::Invalid(
                "FORMFLOW_MAX_LOOP_ITERATIONS",
                "must be a positive integer",
            ));
        }

        let default_retry_delay_ms: u64 =
            env_parse("FORMFLOW_DEFAULT_RETRY_DELAY_MS", defaults.default_retry_delay_ms)
                .map_err(|_| {
                    ConfigError::Invalid(
                        "FORMFLOW_DEFAULT_RETRY_DELAY_MS",
                        "must be a non-negative integer",
                    )
                })?;

        Ok(Self {
            timeout_enabled,
            timeout_secs,
            max_loop_iterations,
            notify_on_abort,
            default_retry_delay_ms,
        })
    }

    /// Enable or disable the default timeout.
    pub fn with_timeout(mut self, enabled: bool, secs: u64) -> Self {
        self.timeout_enabled = enabled;
        self.timeout_secs = secs;
        self
    }

    /// Set the loop iteration cap.
    pub fn with_max_loop_iterations(mut self, max: u32) -> Self {
        self.max_loop_iterations = max;
        self
    }

    /// Notify users when a submission is aborted.
    pub fn with_notify_on_abort(mut self, notify: bool) -> Self {
        self.notify_on_abort = notify;
        self
    }

    /// Set the retry delay used when a strategy has none.
    pub fn with_default_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.default_retry_delay_ms = delay_ms;
        self
    }

    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v == "true" || v == "1" || v == "yes"
        })
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, T::Err> {
    match env::var(name) {
        Ok(v) => v.trim().parse(),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
