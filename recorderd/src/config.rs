//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Malformed values fall back to their defaults instead of failing startup.

use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use recorder_exec::{DispatcherConfig, QueueFullPolicy};
use recorder_store::{DEFAULT_FLOW_STATUS_TTL, DEFAULT_MAX_ATTEMPTS};

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub api: ApiConfig,
    /// Redis connection URL
    pub redis_url: String,
    /// Deployment environment name, lower-cased (e.g. `dev`, `prod`)
    pub environment: String,
    /// Ingest behaviour
    pub ingest: IngestConfig,
    /// Background dispatcher
    pub dispatcher: AsyncConfig,
    /// Network-observability sink (bearer token credential)
    pub observability: SinkConfig,
    /// Persistence sink (API key credential)
    pub persistence: SinkConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Skip the synchronous document merge
    pub skip_cache_update: bool,
    /// Skip the observability push job
    pub skip_no_push: bool,
    /// Skip the persistence job
    pub skip_db_save: bool,
    /// Per-entry ttl applied when the event carries none
    pub api_ttl_secs_default: i64,
    /// Cache TTL override applied when the event carries none (0 keeps the residual TTL)
    pub cache_ttl_secs_default: i64,
    /// Compare-and-swap attempt ceiling
    pub merge_max_attempts: u32,
    /// TTL written with the flow status
    pub flow_status_ttl: Duration,
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct AsyncConfig {
    /// Queue capacity
    pub queue_size: usize,
    /// Worker count
    pub workers: usize,
    /// Drop jobs when the queue is full (otherwise block)
    pub drop_on_full: bool,
    /// Per-job timeout
    pub job_timeout: Duration,
}

/// Downstream sink configuration.
#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    /// Base URL; blank disables the sink
    pub url: String,
    /// Bearer token or API key; blank sends none
    pub credential: String,
    /// Request timeout
    pub timeout: Duration,
    /// Environments the sink runs in; empty means all
    pub enabled_envs: BTreeSet<String>,
}

impl SinkConfig {
    /// Whether the sink should run in `environment`.
    pub fn is_enabled_for(&self, environment: &str) -> bool {
        !self.url.trim().is_empty()
            && (self.enabled_envs.is_empty() || self.enabled_envs.contains(environment))
    }
}

impl AsyncConfig {
    /// Dispatcher settings derived from this configuration.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue_size: self.queue_size,
            workers: self.workers,
            policy: if self.drop_on_full { QueueFullPolicy::Drop } else { QueueFullPolicy::Block },
            job_timeout: self.job_timeout,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let port_str = vars.string("RECORDER_HTTP_PORT").unwrap_or_else(|| "8090".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid RECORDER_HTTP_PORT: {}", port_str)))?;

        let environment = vars
            .string("RECORDER_ENV")
            .map(|env| env.to_lowercase())
            .unwrap_or_else(|| "dev".to_string());

        let queue_size = vars.int("RECORDER_ASYNC_QUEUE_SIZE", 1000);
        let workers = vars.int("RECORDER_ASYNC_WORKERS", 2);

        Ok(Self {
            api: ApiConfig {
                host: vars.string("RECORDER_HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            redis_url: redis_url(&vars),
            environment,
            ingest: IngestConfig {
                skip_cache_update: vars.bool("RECORDER_SKIP_CACHE_UPDATE", false),
                skip_no_push: vars.bool("RECORDER_SKIP_NO_PUSH", false),
                skip_db_save: vars.bool("RECORDER_SKIP_DB_SAVE", false),
                api_ttl_secs_default: vars.int("RECORDER_API_TTL_SECONDS_DEFAULT", 30000).max(0),
                cache_ttl_secs_default: vars.int("RECORDER_CACHE_TTL_SECONDS_DEFAULT", 0).max(0),
                merge_max_attempts: vars
                    .int("RECORDER_MERGE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS as i64)
                    .clamp(1, u32::MAX as i64) as u32,
                flow_status_ttl: Duration::from_secs(
                    vars.int("RECORDER_FLOW_STATUS_TTL_SECS", DEFAULT_FLOW_STATUS_TTL.as_secs() as i64)
                        .max(1) as u64,
                ),
            },
            dispatcher: AsyncConfig {
                queue_size: if queue_size <= 0 { 1000 } else { queue_size as usize },
                workers: workers.max(1) as usize,
                drop_on_full: vars.bool("RECORDER_ASYNC_DROP_ON_FULL", true),
                job_timeout: vars.millis("RECORDER_ASYNC_JOB_TIMEOUT_MS", 15000),
            },
            observability: SinkConfig {
                url: vars.string("RECORDER_NO_URL").unwrap_or_default(),
                credential: vars.string("RECORDER_NO_BEARER_TOKEN").unwrap_or_default(),
                timeout: vars.millis("RECORDER_NO_TIMEOUT_MS", 5000),
                enabled_envs: parse_env_set(&vars.string("RECORDER_NO_ENABLED_ENVS").unwrap_or_default()),
            },
            persistence: SinkConfig {
                url: vars.string("RECORDER_DB_BASE_URL").unwrap_or_default(),
                credential: vars.string("RECORDER_DB_API_KEY").unwrap_or_default(),
                timeout: vars.millis("RECORDER_DB_TIMEOUT_MS", 5000),
                enabled_envs: parse_env_set(&vars.string("RECORDER_DB_ENABLED_ENVS").unwrap_or_default()),
            },
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            environment: "test".to_string(),
            ..Self::default()
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8090,
            },
            redis_url: "redis://127.0.0.1:6379".to_string(),
            environment: "dev".to_string(),
            ingest: IngestConfig {
                skip_cache_update: false,
                skip_no_push: false,
                skip_db_save: false,
                api_ttl_secs_default: 30000,
                cache_ttl_secs_default: 0,
                merge_max_attempts: DEFAULT_MAX_ATTEMPTS,
                flow_status_ttl: DEFAULT_FLOW_STATUS_TTL,
            },
            dispatcher: AsyncConfig {
                queue_size: 1000,
                workers: 2,
                drop_on_full: true,
                job_timeout: Duration::from_millis(15000),
            },
            observability: SinkConfig { timeout: Duration::from_millis(5000), ..SinkConfig::default() },
            persistence: SinkConfig { timeout: Duration::from_millis(5000), ..SinkConfig::default() },
        }
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Trimmed, non-blank variable access with lenient typed parsing.
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.string(key).and_then(|v| parse_bool(&v)).unwrap_or(default)
    }

    fn int(&self, key: &str, default: i64) -> i64 {
        self.string(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn millis(&self, key: &str, default: i64) -> Duration {
        Duration::from_millis(self.int(key, default).max(0) as u64)
    }
}

/// Parse a boolean flag. Unrecognised values yield `None`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma-separated environment list: trimmed, lower-cased, blanks dropped.
pub fn parse_env_set(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

/// `REDIS_URL` wins; otherwise build one from `REDIS_ADDR`/`REDIS_HOST`
/// plus optional `REDIS_USERNAME`/`REDIS_PASSWORD`.
fn redis_url<F>(vars: &Vars<'_, F>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = vars.string("REDIS_URL") {
        return url;
    }

    let addr = vars
        .string("REDIS_ADDR")
        .or_else(|| vars.string("REDIS_HOST"))
        .unwrap_or_else(|| "127.0.0.1:6379".to_string());

    match (vars.string("REDIS_USERNAME"), vars.string("REDIS_PASSWORD")) {
        (Some(user), Some(password)) => format!("redis://{}:{}@{}", user, password, addr),
        (None, Some(password)) => format!("redis://:{}@{}", password, addr),
        _ => format!("redis://{}", addr),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.api.port, 8090);
        assert_eq!(config.environment, "dev");
        assert_eq!(config.ingest.merge_max_attempts, 8);
        assert_eq!(config.dispatcher.job_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.api.port, 0);
        assert_eq!(config.environment, "test");
    }

    #[test]
    fn test_empty_environment_matches_defaults() {
        let config = load(&[]);
        let defaults = Config::default();

        assert_eq!(config.api.host, defaults.api.host);
        assert_eq!(config.api.port, defaults.api.port);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.dispatcher.queue_size, 1000);
        assert_eq!(config.dispatcher.workers, 2);
        assert!(config.dispatcher.drop_on_full);
        assert_eq!(config.ingest.api_ttl_secs_default, 30000);
        assert_eq!(config.ingest.flow_status_ttl, Duration::from_secs(18000));
    }

    #[test]
    fn test_invalid_port_is_error() {
        let result = Config::from_lookup(|key| (key == "RECORDER_HTTP_PORT").then(|| "nope".to_string()));
        assert!(matches!(result, Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_lenient_values_fall_back() {
        let config = load(&[
            ("RECORDER_ASYNC_QUEUE_SIZE", "-5"),
            ("RECORDER_ASYNC_WORKERS", "0"),
            ("RECORDER_ASYNC_DROP_ON_FULL", "maybe"),
            ("RECORDER_API_TTL_SECONDS_DEFAULT", "-1"),
            ("RECORDER_CACHE_TTL_SECONDS_DEFAULT", "abc"),
            ("RECORDER_MERGE_MAX_ATTEMPTS", "0"),
        ]);

        assert_eq!(config.dispatcher.queue_size, 1000);
        assert_eq!(config.dispatcher.workers, 1);
        assert!(config.dispatcher.drop_on_full);
        assert_eq!(config.ingest.api_ttl_secs_default, 0);
        assert_eq!(config.ingest.cache_ttl_secs_default, 0);
        assert_eq!(config.ingest.merge_max_attempts, 1);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RECORDER_ENV", " PROD "),
            ("RECORDER_SKIP_DB_SAVE", "yes"),
            ("RECORDER_ASYNC_DROP_ON_FULL", "off"),
            ("RECORDER_ASYNC_JOB_TIMEOUT_MS", "250"),
            ("RECORDER_NO_URL", "https://no.example"),
            ("RECORDER_NO_ENABLED_ENVS", "Prod, staging ,,"),
        ]);

        assert_eq!(config.environment, "prod");
        assert!(config.ingest.skip_db_save);
        assert!(!config.ingest.skip_no_push);
        assert_eq!(config.dispatcher.dispatcher_config().policy, QueueFullPolicy::Block);
        assert_eq!(config.dispatcher.job_timeout, Duration::from_millis(250));
        assert!(config.observability.is_enabled_for("prod"));
        assert!(!config.observability.is_enabled_for("dev"));
        assert!(!config.persistence.is_enabled_for("prod"));
    }

    #[test]
    fn test_redis_url_resolution() {
        assert_eq!(load(&[("REDIS_URL", "redis://r:1")]).redis_url, "redis://r:1");
        assert_eq!(load(&[("REDIS_HOST", "cache:6380")]).redis_url, "redis://cache:6380");
        assert_eq!(
            load(&[("REDIS_ADDR", "a:1"), ("REDIS_HOST", "b:2"), ("REDIS_PASSWORD", "pw")]).redis_url,
            "redis://:pw@a:1"
        );
        assert_eq!(
            load(&[("REDIS_ADDR", "a:1"), ("REDIS_USERNAME", "u"), ("REDIS_PASSWORD", "pw")]).redis_url,
            "redis://u:pw@a:1"
        );
    }

    #[test]
    fn test_parse_bool() {
        for truthy in ["1", "true", "YES", "y", "On"] {
            assert_eq!(parse_bool(truthy), Some(true), "{}", truthy);
        }
        for falsy in ["0", "false", "no", "N", "off"] {
            assert_eq!(parse_bool(falsy), Some(false), "{}", falsy);
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn test_parse_env_set() {
        let set = parse_env_set(" Dev, PROD ,, ");
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["dev", "prod"]);
        assert!(parse_env_set("").is_empty());
    }

    #[test]
    fn test_sink_without_url_is_disabled() {
        let sink = SinkConfig::default();
        assert!(!sink.is_enabled_for("dev"));
    }
}
