//! Configuration for the load generator.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `CACHELOAD__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `CACHELOAD__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `CACHELOAD__HOST=http://cache:7171` sets the cache under test
//! - `CACHELOAD__WORKLOAD__WRITE_RATIO=0.2` sets the share of writes
//!
//! # YAML Configuration File
//!
//! ```yaml
//! host: http://cache:7171
//! users: 100
//! spawn_rate: 10
//! duration: 5m
//!
//! workload:
//!   pool_size: 10000
//!   value_length: 256
//!   write_ratio: 0.2
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::http::parse_host;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CACHELOAD__";

/// Number of keys, and of values, generated before the run.
pub const DEFAULT_POOL_SIZE: usize = 10_000;
/// Length of every generated value in characters.
pub const DEFAULT_VALUE_LENGTH: usize = 256;
/// Share of requests that are writes.
pub const DEFAULT_WRITE_RATIO: f64 = 0.5;

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The host is not a usable base URL.
    #[error("invalid host `{0}`")]
    InvalidHost(String),
    /// At least one virtual user is needed.
    #[error("users must be at least 1")]
    NoUsers,
    /// Spawn rates must be positive and leave a representable pause between users.
    #[error("spawn rate must be a positive number, got {0}")]
    InvalidSpawnRate(f64),
    /// An iteration limit of zero would not send anything.
    #[error("iterations must be at least 1")]
    NoIterations,
    /// Pools need at least one entry.
    #[error("pool size must be at least 1")]
    EmptyPool,
    /// The write ratio is not a probability.
    #[error("write ratio must be within [0, 1], got {0}")]
    InvalidWriteRatio(f64),
}

/// Shape of the generated traffic.
///
/// Used in: [`Config::workload`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Workload {
    /// Number of distinct keys, and of values.
    ///
    /// # Default
    ///
    /// [`DEFAULT_POOL_SIZE`]
    pub pool_size: usize,

    /// Length of every value in characters.
    ///
    /// # Default
    ///
    /// [`DEFAULT_VALUE_LENGTH`]
    pub value_length: usize,

    /// Probability of a request being a write, between `0.0` (only reads) and `1.0` (only writes).
    ///
    /// # Default
    ///
    /// [`DEFAULT_WRITE_RATIO`]
    pub write_ratio: f64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            value_length: DEFAULT_VALUE_LENGTH,
            write_ratio: DEFAULT_WRITE_RATIO,
        }
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, the report goes to stdout.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `INFO`
    #[serde(with = "log_level")]
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

/// Reads and writes log levels by name, e.g. `debug` or `off`.
mod log_level {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(level)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.trim().parse().map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&name),
                &"one of off, error, warn, info, debug, trace",
            )
        })
    }
}

/// Main configuration struct for the load generator.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the cache under test.
    ///
    /// Requests go to `{host}/put` and `{host}/get`.
    ///
    /// # Default
    ///
    /// `http://localhost:7171`
    pub host: String,

    /// Number of concurrent virtual users.
    ///
    /// Every user sends requests back to back, without waiting in between.
    ///
    /// # Default
    ///
    /// `10`
    pub users: usize,

    /// Users started per second until all users run.
    ///
    /// # Default
    ///
    /// Not set, all users start at once.
    pub spawn_rate: Option<f64>,

    /// How long the load test runs, e.g. `30s` or `5m`.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Total number of requests after which the load test stops, even before `duration` passed.
    ///
    /// # Default
    ///
    /// Not set, the run is only bounded by `duration`.
    pub iterations: Option<u64>,

    /// Requests taking longer than this count as failed.
    ///
    /// # Default
    ///
    /// Not set, requests wait for as long as the server takes.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Seed for the pools and the request sequence of every user.
    ///
    /// # Default
    ///
    /// Not set, every run is different.
    pub seed: Option<u64>,

    /// Shape of the generated traffic.
    pub workload: Workload,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost:7171".to_owned(),
            users: 10,
            spawn_rate: None,
            duration: Duration::from_secs(60),
            iterations: None,
            request_timeout: None,
            seed: None,

            workload: Workload::default(),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, the optional YAML file at `path` and the environment.
    ///
    /// Later sources override earlier ones. The result is not validated yet, see
    /// [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Checks all values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if parse_host(&self.host).is_err() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }
        self.spawn_interval()?;
        if self.iterations == Some(0) {
            return Err(ConfigError::NoIterations);
        }
        if self.workload.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        let ratio = self.workload.write_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidWriteRatio(ratio));
        }

        Ok(())
    }

    /// The pause between starting two virtual users, `None` if all start at once.
    pub fn spawn_interval(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(rate) = self.spawn_rate else {
            return Ok(None);
        };
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::InvalidSpawnRate(rate));
        }

        Duration::try_from_secs_f64(rate.recip())
            .map(Some)
            .map_err(|_| ConfigError::InvalidSpawnRate(rate))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.host, "http://localhost:7171");
            assert_eq!(config.users, 10);
            assert_eq!(config.spawn_rate, None);
            assert_eq!(config.duration, Duration::from_secs(60));
            assert_eq!(config.iterations, None);
            assert_eq!(config.request_timeout, None);
            assert_eq!(config.seed, None);
            assert_eq!(config.workload.pool_size, 10_000);
            assert_eq!(config.workload.value_length, 256);
            assert_eq!(config.workload.write_ratio, 0.5);
            assert_eq!(config.logging.level, LevelFilter::INFO);
            config.validate().unwrap();

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CACHELOAD__HOST", "http://cache:9000");
            jail.set_env("CACHELOAD__USERS", "64");
            jail.set_env("CACHELOAD__SPAWN_RATE", "2.5");
            jail.set_env("CACHELOAD__DURATION", "5m");
            jail.set_env("CACHELOAD__REQUEST_TIMEOUT", "250ms");
            jail.set_env("CACHELOAD__SEED", "42");
            jail.set_env("CACHELOAD__WORKLOAD__WRITE_RATIO", "0.1");
            jail.set_env("CACHELOAD__LOGGING__LEVEL", "debug");

            let config = Config::load(None).unwrap();

            assert_eq!(config.host, "http://cache:9000");
            assert_eq!(config.users, 64);
            assert_eq!(config.spawn_rate, Some(2.5));
            assert_eq!(config.duration, Duration::from_secs(300));
            assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
            assert_eq!(config.seed, Some(42));
            assert_eq!(config.workload.write_ratio, 0.1);
            assert_eq!(config.workload.pool_size, DEFAULT_POOL_SIZE);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            host: http://localhost:8080
            users: 4
            duration: 10s
            iterations: 1000
            workload:
                pool_size: 4
                write_ratio: 1.0
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.host, "http://localhost:8080");
            assert_eq!(config.users, 4);
            assert_eq!(config.duration, Duration::from_secs(10));
            assert_eq!(config.iterations, Some(1000));
            assert_eq!(config.workload.pool_size, 4);
            assert_eq!(config.workload.value_length, DEFAULT_VALUE_LENGTH);
            assert_eq!(config.workload.write_ratio, 1.0);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            users: 4
            workload:
                write_ratio: 1.0
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("CACHELOAD__WORKLOAD__WRITE_RATIO", "0.0");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.workload.write_ratio, 0.0);
            assert_eq!(config.users, 4);

            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_values() {
        let cases: [(fn(&mut Config), fn(&ConfigError) -> bool); 9] = [
            (
                |c| c.host = "localhost".into(),
                |e| matches!(e, ConfigError::InvalidHost(_)),
            ),
            (|c| c.users = 0, |e| matches!(e, ConfigError::NoUsers)),
            (
                |c| c.spawn_rate = Some(0.0),
                |e| matches!(e, ConfigError::InvalidSpawnRate(_)),
            ),
            (
                |c| c.spawn_rate = Some(f64::INFINITY),
                |e| matches!(e, ConfigError::InvalidSpawnRate(_)),
            ),
            (
                |c| c.spawn_rate = Some(-1.0),
                |e| matches!(e, ConfigError::InvalidSpawnRate(_)),
            ),
            // one user every 1e30 seconds does not fit into a `Duration`
            (
                |c| c.spawn_rate = Some(1e-30),
                |e| matches!(e, ConfigError::InvalidSpawnRate(_)),
            ),
            (|c| c.iterations = Some(0), |e| matches!(e, ConfigError::NoIterations)),
            (|c| c.workload.pool_size = 0, |e| matches!(e, ConfigError::EmptyPool)),
            (
                |c| c.workload.write_ratio = f64::NAN,
                |e| matches!(e, ConfigError::InvalidWriteRatio(_)),
            ),
        ];

        for (modify, expected) in cases {
            let mut config = Config::default();
            modify(&mut config);
            let err = config.validate().unwrap_err();
            assert!(expected(&err), "unexpected error: {err}");
        }
    }

    #[test]
    fn rejects_unknown_log_level() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CACHELOAD__LOGGING__LEVEL", "loud");
            assert!(Config::load(None).is_err());

            jail.set_env("CACHELOAD__LOGGING__LEVEL", "OFF");
            assert_eq!(Config::load(None).unwrap().logging.level, LevelFilter::OFF);

            Ok(())
        });
    }

    #[test]
    fn spawn_interval_from_rate() {
        let mut config = Config::default();
        assert_eq!(config.spawn_interval().unwrap(), None);

        config.spawn_rate = Some(4.0);
        assert_eq!(
            config.spawn_interval().unwrap(),
            Some(Duration::from_millis(250))
        );

        config.spawn_rate = Some(0.001);
        assert_eq!(
            config.spawn_interval().unwrap(),
            Some(Duration::from_secs(1000))
        );
    }

    #[test]
    fn accepts_ratio_bounds() {
        for ratio in [0.0, 1.0] {
            let mut config = Config::default();
            config.workload.write_ratio = ratio;
            config.validate().unwrap();
        }
    }
}
