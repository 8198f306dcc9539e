//! Pipeline configuration.
//!
//! Resolution order, lowest to highest: built-in defaults, a TOML file, the
//! process environment, then whatever the embedding binary applies on top
//! (CLI flags). Every section is optional in the file; absent keys keep their
//! defaults.
//!
//! ```toml
//! maintenance_interval_secs = 60
//!
//! [cache]
//! ttl_secs = 900
//!
//! [platforms.codeforces]
//! max_concurrency = 1
//! call_timeout_ms = 8000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::{BandwidthConfig, RateLimitConfig};
use crate::platform::Platform;
use crate::policy::PlatformPolicy;
use crate::render::{RenderPoolConfig, SurfaceOptions};

pub const ENV_CONFIG_PATH: &str = "CPSTATS_CONFIG";
pub const ENV_CACHE_TTL_SECS: &str = "CPSTATS_CACHE_TTL_SECS";
pub const ENV_GITHUB_TOKEN: &str = "CPSTATS_GITHUB_TOKEN";
pub const ENV_GITHUB_TOKEN_FALLBACK: &str = "GITHUB_TOKEN";
pub const ENV_USER_AGENT: &str = "CPSTATS_USER_AGENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {key} has invalid value '{value}': {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: &'static str },
}

impl ConfigError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "config.read",
            Self::Parse { .. } => "config.parse",
            Self::InvalidEnv { .. } => "config.invalid_env",
            Self::Invalid { .. } => "config.invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Period of the background cache, trace and governor sweeps.
    pub maintenance_interval_secs: u64,
    pub cache: CacheSection,
    pub trace: TraceSection,
    pub http: HttpSection,
    pub rate_limit: RateLimitSection,
    pub bandwidth: BandwidthSection,
    pub render: RenderSection,
    pub platforms: BTreeMap<Platform, PlatformOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            maintenance_interval_secs: 60,
            cache: CacheSection::default(),
            trace: TraceSection::default(),
            http: HttpSection::default(),
            rate_limit: RateLimitSection::default(),
            bandwidth: BandwidthSection::default(),
            render: RenderSection::default(),
            platforms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSection {
    pub retention_secs: u64,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self { retention_secs: 5 * 60 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Overrides the desktop browser user agent sent upstream.
    pub user_agent: Option<String>,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub base_quota: u32,
    pub window_secs: u64,
    pub floor: u32,
    pub penalty_per_suspicion: u32,
    pub burst_limit: u32,
    pub burst_window_ms: u64,
    pub violation_suspicion: u32,
    pub burst_suspicion: u32,
    pub block_threshold: u32,
    pub block_duration_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            base_quota: defaults.base_quota,
            window_secs: defaults.window.as_secs(),
            floor: defaults.floor,
            penalty_per_suspicion: defaults.penalty_per_suspicion,
            burst_limit: defaults.burst_limit,
            burst_window_ms: millis(defaults.burst_window),
            violation_suspicion: defaults.violation_suspicion,
            burst_suspicion: defaults.burst_suspicion,
            block_threshold: defaults.block_threshold,
            block_duration_secs: defaults.block_duration.as_secs(),
        }
    }
}

impl RateLimitSection {
    pub fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_quota: self.base_quota,
            window: Duration::from_secs(self.window_secs),
            floor: self.floor,
            penalty_per_suspicion: self.penalty_per_suspicion,
            burst_limit: self.burst_limit,
            burst_window: Duration::from_millis(self.burst_window_ms),
            violation_suspicion: self.violation_suspicion,
            burst_suspicion: self.burst_suspicion,
            block_threshold: self.block_threshold,
            block_duration: Duration::from_secs(self.block_duration_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthSection {
    pub per_ip_minute_bytes: u64,
    pub per_ip_hour_bytes: u64,
    pub global_hour_bytes: u64,
}

impl Default for BandwidthSection {
    fn default() -> Self {
        let defaults = BandwidthConfig::default();
        Self {
            per_ip_minute_bytes: defaults.per_ip_minute,
            per_ip_hour_bytes: defaults.per_ip_hour,
            global_hour_bytes: defaults.global_hour,
        }
    }
}

impl BandwidthSection {
    pub const fn to_config(&self) -> BandwidthConfig {
        BandwidthConfig {
            per_ip_minute: self.per_ip_minute_bytes,
            per_ip_hour: self.per_ip_hour_bytes,
            global_hour: self.global_hour_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    pub max_instances: usize,
    pub acquire_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for RenderSection {
    fn default() -> Self {
        let pool = RenderPoolConfig::default();
        Self {
            max_instances: pool.max_instances,
            acquire_timeout_ms: millis(pool.acquire_timeout),
            navigation_timeout_ms: millis(SurfaceOptions::default().navigation_timeout),
        }
    }
}

impl RenderSection {
    pub const fn pool_config(&self) -> RenderPoolConfig {
        RenderPoolConfig {
            max_instances: self.max_instances,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }
}

/// Per-platform policy overrides; unset keys keep the platform default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformOverride {
    pub max_concurrency: Option<usize>,
    pub max_queue: Option<usize>,
    pub call_timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

impl PlatformOverride {
    pub fn apply(&self, policy: &mut PlatformPolicy) {
        if let Some(value) = self.max_concurrency {
            policy.max_concurrency = value;
        }
        if let Some(value) = self.max_queue {
            policy.max_queue = value;
        }
        if let Some(value) = self.call_timeout_ms {
            policy.call_timeout = Duration::from_millis(value);
        }
        if let Some(value) = self.failure_threshold {
            policy.breaker.failure_threshold = value;
        }
        if let Some(value) = self.cooldown_secs {
            policy.breaker.cooldown = Duration::from_secs(value);
        }
        if let Some(value) = self.initial_backoff_ms {
            policy.retry_backoff.initial_delay = Duration::from_millis(value);
        }
        if let Some(value) = self.max_backoff_ms {
            policy.retry_backoff.max_delay = Duration::from_millis(value);
        }
        if let Some(value) = self.max_retries {
            policy.retry_backoff.max_retries = value;
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse { source })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, then `path` (or `CPSTATS_CONFIG` when `path` is `None`),
    /// then the process environment. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(ENV_CONFIG_PATH)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the `CPSTATS_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = read(ENV_CACHE_TTL_SECS) {
            self.cache.ttl_secs = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_CACHE_TTL_SECS,
                    value: value.clone(),
                    reason: "expected a whole number of seconds",
                })?;
        }

        if let Some(token) = read(ENV_GITHUB_TOKEN).or_else(|| read(ENV_GITHUB_TOKEN_FALLBACK)) {
            self.http.github_token = Some(token);
        }

        if let Some(user_agent) = read(ENV_USER_AGENT) {
            self.http.user_agent = Some(user_agent);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("maintenance_interval_secs", self.maintenance_interval_secs),
            ("trace.retention_secs", self.trace.retention_secs),
            ("rate_limit.base_quota", u64::from(self.rate_limit.base_quota)),
            ("rate_limit.window_secs", self.rate_limit.window_secs),
            ("rate_limit.burst_limit", u64::from(self.rate_limit.burst_limit)),
            ("rate_limit.burst_window_ms", self.rate_limit.burst_window_ms),
            ("rate_limit.block_threshold", u64::from(self.rate_limit.block_threshold)),
            ("bandwidth.per_ip_minute_bytes", self.bandwidth.per_ip_minute_bytes),
            ("bandwidth.per_ip_hour_bytes", self.bandwidth.per_ip_hour_bytes),
            ("bandwidth.global_hour_bytes", self.bandwidth.global_hour_bytes),
            ("render.max_instances", self.render.max_instances as u64),
            ("render.acquire_timeout_ms", self.render.acquire_timeout_ms),
            ("render.navigation_timeout_ms", self.render.navigation_timeout_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_owned(),
                    reason: "must be greater than zero",
                });
            }
        }

        if self.rate_limit.floor > self.rate_limit.base_quota {
            return Err(ConfigError::Invalid {
                field: String::from("rate_limit.floor"),
                reason: "must not exceed rate_limit.base_quota",
            });
        }

        for platform in Platform::ALL {
            let policy = self.policy_for(platform);
            let field = |name: &str| format!("platforms.{platform}.{name}");
            if policy.max_concurrency == 0 {
                return Err(ConfigError::Invalid {
                    field: field("max_concurrency"),
                    reason: "must be greater than zero",
                });
            }
            if policy.call_timeout.is_zero() {
                return Err(ConfigError::Invalid {
                    field: field("call_timeout_ms"),
                    reason: "must be greater than zero",
                });
            }
            if policy.breaker.failure_threshold == 0 {
                return Err(ConfigError::Invalid {
                    field: field("failure_threshold"),
                    reason: "must be greater than zero",
                });
            }
            if policy.retry_backoff.initial_delay > policy.retry_backoff.max_delay {
                return Err(ConfigError::Invalid {
                    field: field("initial_backoff_ms"),
                    reason: "must not exceed max_backoff_ms",
                });
            }
        }
        Ok(())
    }

    /// Platform default with any configured override applied.
    pub fn policy_for(&self, platform: Platform) -> PlatformPolicy {
        let mut policy = PlatformPolicy::default_for(platform);
        if let Some(overrides) = self.platforms.get(&platform) {
            overrides.apply(&mut policy);
        }
        policy
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub const fn trace_retention(&self) -> Duration {
        Duration::from_secs(self.trace.retention_secs)
    }

    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn surface_options(&self) -> SurfaceOptions {
        let options = SurfaceOptions::default()
            .with_navigation_timeout(Duration::from_millis(self.render.navigation_timeout_ms));
        match &self.http.user_agent {
            Some(user_agent) => options.with_user_agent(user_agent.clone()),
            None => options,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();

        config.validate().expect("defaults validate");
        assert_eq!(config.cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.trace_retention(), Duration::from_secs(300));
        assert_eq!(config.rate_limit.to_config(), RateLimitConfig::default());
        assert_eq!(config.bandwidth.to_config(), BandwidthConfig::default());
        assert_eq!(config.render.pool_config(), RenderPoolConfig::default());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [cache]
            ttl_secs = 60

            [platforms.codeforces]
            max_concurrency = 1
            call_timeout_ms = 8000
            max_retries = 0
            "#,
        )
        .expect("parses");

        assert!(config.cache.enabled);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.rate_limit, RateLimitSection::default());

        let codeforces = config.policy_for(Platform::Codeforces);
        assert_eq!(codeforces.max_concurrency, 1);
        assert_eq!(codeforces.call_timeout, Duration::from_secs(8));
        assert!(!codeforces.retry_config().enabled);
        assert_eq!(
            codeforces.max_queue,
            PlatformPolicy::codeforces_default().max_queue
        );
        assert_eq!(
            config.policy_for(Platform::LeetCode),
            PlatformPolicy::leetcode_default()
        );
    }

    #[test]
    fn unknown_platform_override_keys_are_rejected() {
        let error = PipelineConfig::from_toml_str(
            r#"
            [platforms.github]
            max_concurency = 3
            "#,
        )
        .expect_err("typo must fail");

        assert_eq!(error.code(), "config.parse");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = PipelineConfig::from_toml_str("[cache]\nttl_secs = 60\n").expect("parses");

        config
            .apply_env(env(&[
                (ENV_CACHE_TTL_SECS, "120"),
                (ENV_GITHUB_TOKEN_FALLBACK, "ghp_fallback"),
                (ENV_USER_AGENT, "cpstats-test/1.0"),
            ]))
            .expect("applies");

        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
        assert_eq!(config.http.github_token.as_deref(), Some("ghp_fallback"));
        assert_eq!(config.surface_options().user_agent, "cpstats-test/1.0");
    }

    #[test]
    fn primary_token_variable_wins_over_fallback() {
        let mut config = PipelineConfig::default();

        config
            .apply_env(env(&[
                (ENV_GITHUB_TOKEN, "ghp_primary"),
                (ENV_GITHUB_TOKEN_FALLBACK, "ghp_fallback"),
            ]))
            .expect("applies");

        assert_eq!(config.http.github_token.as_deref(), Some("ghp_primary"));
    }

    #[test]
    fn malformed_environment_value_is_reported() {
        let mut config = PipelineConfig::default();

        let error = config
            .apply_env(env(&[(ENV_CACHE_TTL_SECS, "fifteen minutes")]))
            .expect_err("must fail");

        assert!(matches!(
            error,
            ConfigError::InvalidEnv {
                key: ENV_CACHE_TTL_SECS,
                ..
            }
        ));
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let mut config = PipelineConfig::default();
        config.platforms.insert(
            Platform::AtCoder,
            PlatformOverride {
                max_concurrency: Some(0),
                ..PlatformOverride::default()
            },
        );

        let error = config.validate().expect_err("zero concurrency");
        let ConfigError::Invalid { field, .. } = error else {
            panic!("expected invalid field");
        };
        assert_eq!(field, "platforms.atcoder.max_concurrency");

        let mut config = PipelineConfig::default();
        config.render.max_instances = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_is_loaded_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "maintenance_interval_secs = 5\n[render]\nmax_instances = 1").expect("write");

        let config = PipelineConfig::from_file(file.path()).expect("loads");

        assert_eq!(config.maintenance_interval(), Duration::from_secs(5));
        assert_eq!(config.render.max_instances, 1);

        let missing = PipelineConfig::from_file("/nonexistent/cpstats.toml").expect_err("missing");
        assert_eq!(missing.code(), "config.read");
    }
}
