//! Retry strategies and backoff policies for the migration execution core.
//!
//! Both the Operation Executor (bounded retries around a single operation's
//! `execute` call) and the Test-Case Pipeline (bounded retries around a
//! single item's target-side create) share this crate's backoff math so the
//! two retry loops behave consistently.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy for spacing out retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay between retries.
    Immediate,
    /// Delay doubles each attempt (default).
    #[default]
    Exponential,
    /// Delay increases linearly with attempt number.
    Linear,
    /// Same delay every attempt.
    Constant,
}

/// Predefined retry policies with sensible defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Balanced behavior, good for most migrations.
    #[default]
    Default,
    /// More attempts, shorter delays — for flaky but fast providers.
    Aggressive,
    /// Fewer attempts, longer delays — for rate-limited providers.
    Conservative,
    /// Fully custom configuration via `RetryStrategyConfig`.
    Custom,
}

impl RetryPolicy {
    pub fn to_config(self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::Default => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                jitter: 0.2,
            },
            RetryPolicy::Aggressive => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 6,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(15),
                jitter: 0.3,
            },
            RetryPolicy::Conservative => RetryStrategyConfig {
                strategy: RetryStrategyType::Linear,
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
                jitter: 0.1,
            },
            RetryPolicy::Custom => RetryStrategyConfig::default(),
        }
    }
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    #[serde(default)]
    pub strategy: RetryStrategyType,
    /// Maximum number of attempts, including the first. A value of `1` means
    /// no retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    #[serde(default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,
    /// Jitter factor (0.0 = none, 1.0 = full jitter: delay * [0, 2]).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}
fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryPolicy::Default.to_config()
    }
}

/// Deserialize a `Duration` from either a human-readable string (`"500ms"`) or
/// an integer number of milliseconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a `Duration` as milliseconds so it round-trips with
/// [`deserialize_duration`].
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Calculate the delay before the next retry attempt.
///
/// `attempt` is 1-based: the delay returned is the wait *before* attempt
/// number `attempt + 1`.
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt.max(1)),
        RetryStrategyType::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter_range = 2.0 * jitter;
    let random_factor = 1.0 - jitter + (rand::random::<f64>() * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round().max(0.0) as u64;
    Duration::from_millis(millis)
}

/// Runs a fallible operation with bounded retries and backoff between
/// attempts. The closure receives the 1-based attempt number.
pub struct RetryExecutor {
    config: RetryStrategyConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryStrategyConfig) -> Self {
        Self { config }
    }

    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.to_config())
    }

    pub fn config(&self) -> &RetryStrategyConfig {
        &self.config
    }

    /// Run `operation` up to `max_attempts` times, sleeping between attempts
    /// using this executor's backoff. Returns the last error if every
    /// attempt fails, along with how many attempts were made.
    pub fn run<T, E, F>(&self, mut operation: F) -> (Result<T, E>, u32)
    where
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return (Ok(value), attempt),
                Err(err) => {
                    if attempt >= self.config.max_attempts {
                        return (Err(err), attempt);
                    }
                    std::thread::sleep(calculate_delay(&self.config, attempt));
                    attempt += 1;
                }
            }
        }
    }
}
