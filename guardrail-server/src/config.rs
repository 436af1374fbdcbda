//! Layered configuration (§6, §10.3): built-in defaults, then environment
//! variables, then an optional TOML file named by `GUARDRAIL_CONFIG`.

use std::collections::HashMap;
use std::time::Duration;

use guardrail_session::{validate_signing_secret, MIN_SECRET_LEN};
use serde::Deserialize;

/// Keys `reload()` is allowed to change at runtime (§4.6 hot-reload
/// whitelist).
pub const HOT_RELOAD_KEYS: &[&str] = &[
    "GUARDRAIL_LOG_LEVEL",
    "GUARDRAIL_RATE_LIMIT_VALIDATE_PER_MIN",
    "GUARDRAIL_RATE_LIMIT_INIT_PER_MIN",
    "GUARDRAIL_RATE_LIMIT_STREAM_PER_MIN",
    "GUARDRAIL_RULE_CACHE_TTL_SECS",
    "GUARDRAIL_CACHE_TTL_SECS",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub session_signing_secret: String,
    pub ide_api_key: String,
    pub mcp_api_key: String,
    pub rule_store_dsn: String,
    pub cache_address: String,
    pub log_level: String,
    pub session_ttl_secs: u64,
    pub queue_capacity: usize,
    pub rule_cache_ttl_secs: u64,
    pub cache_ttl_secs: u64,
    pub pattern_byte_cap: usize,
    pub pattern_match_deadline_ms: u64,
    pub request_deadline_secs: u64,
    pub rate_limit_validate_per_min: u32,
    pub rate_limit_init_per_min: u32,
    pub rate_limit_stream_per_min: u32,
    pub audit_channel_capacity: usize,
    pub protected_branches: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8787".to_string(),
            session_signing_secret: String::new(),
            ide_api_key: String::new(),
            mcp_api_key: String::new(),
            rule_store_dsn: String::new(),
            cache_address: String::new(),
            log_level: "info".to_string(),
            session_ttl_secs: 15 * 60,
            queue_capacity: 64,
            rule_cache_ttl_secs: 30,
            cache_ttl_secs: 30,
            pattern_byte_cap: 100 * 1024,
            pattern_match_deadline_ms: 100,
            request_deadline_secs: 10,
            rate_limit_validate_per_min: 600,
            rate_limit_init_per_min: 30,
            rate_limit_stream_per_min: 10,
            audit_channel_capacity: 1024,
            protected_branches: vec!["main".to_string(), "master".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load defaults, then env vars, then an optional TOML file named by
    /// `GUARDRAIL_CONFIG` (§10.3: "built-in defaults → environment variables
    /// → optionally a TOML file").
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("GUARDRAIL_CONFIG") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| anyhow::anyhow!("reading {path}: {err}"))?;
            let from_file: Config = toml::from_str(&raw)
                .map_err(|err| anyhow::anyhow!("parsing {path}: {err}"))?;
            config = from_file;
        }

        config.apply_env(&std::env::vars().collect());
        Ok(config)
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) {
        macro_rules! str_field {
            ($key:literal, $field:ident) => {
                if let Some(value) = env.get($key) {
                    self.$field = value.clone();
                }
            };
        }
        macro_rules! num_field {
            ($key:literal, $field:ident) => {
                if let Some(value) = env.get($key) {
                    if let Ok(parsed) = value.parse() {
                        self.$field = parsed;
                    }
                }
            };
        }

        str_field!("GUARDRAIL_LISTEN_ADDR", listen_addr);
        str_field!("GUARDRAIL_SESSION_SIGNING_SECRET", session_signing_secret);
        str_field!("GUARDRAIL_IDE_API_KEY", ide_api_key);
        str_field!("GUARDRAIL_MCP_API_KEY", mcp_api_key);
        str_field!("GUARDRAIL_RULE_STORE_DSN", rule_store_dsn);
        str_field!("GUARDRAIL_CACHE_ADDRESS", cache_address);
        str_field!("GUARDRAIL_LOG_LEVEL", log_level);
        num_field!("GUARDRAIL_SESSION_TTL_SECS", session_ttl_secs);
        num_field!("GUARDRAIL_QUEUE_CAPACITY", queue_capacity);
        num_field!("GUARDRAIL_RULE_CACHE_TTL_SECS", rule_cache_ttl_secs);
        num_field!("GUARDRAIL_CACHE_TTL_SECS", cache_ttl_secs);
        num_field!("GUARDRAIL_PATTERN_BYTE_CAP", pattern_byte_cap);
        num_field!(
            "GUARDRAIL_PATTERN_MATCH_DEADLINE_MS",
            pattern_match_deadline_ms
        );
        num_field!("GUARDRAIL_REQUEST_DEADLINE_SECS", request_deadline_secs);
        num_field!(
            "GUARDRAIL_RATE_LIMIT_VALIDATE_PER_MIN",
            rate_limit_validate_per_min
        );
        num_field!("GUARDRAIL_RATE_LIMIT_INIT_PER_MIN", rate_limit_init_per_min);
        num_field!(
            "GUARDRAIL_RATE_LIMIT_STREAM_PER_MIN",
            rate_limit_stream_per_min
        );
        num_field!("GUARDRAIL_AUDIT_CHANNEL_CAPACITY", audit_channel_capacity);

        if let Some(value) = env.get("GUARDRAIL_PROTECTED_BRANCHES") {
            self.protected_branches = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Re-apply only the whitelisted hot-reload keys (§4.6), leaving
    /// everything else untouched. Returns the keys that were actually present
    /// and applied.
    pub fn reload(&mut self, env: &HashMap<String, String>) -> Vec<&'static str> {
        let mut applied = Vec::new();
        for key in HOT_RELOAD_KEYS {
            if !env.contains_key(*key) {
                continue;
            }
            match *key {
                "GUARDRAIL_LOG_LEVEL" => {
                    self.log_level = env[*key].clone();
                    applied.push(*key);
                }
                "GUARDRAIL_RATE_LIMIT_VALIDATE_PER_MIN" => {
                    if let Ok(v) = env[*key].parse() {
                        self.rate_limit_validate_per_min = v;
                        applied.push(*key);
                    }
                }
                "GUARDRAIL_RATE_LIMIT_INIT_PER_MIN" => {
                    if let Ok(v) = env[*key].parse() {
                        self.rate_limit_init_per_min = v;
                        applied.push(*key);
                    }
                }
                "GUARDRAIL_RATE_LIMIT_STREAM_PER_MIN" => {
                    if let Ok(v) = env[*key].parse() {
                        self.rate_limit_stream_per_min = v;
                        applied.push(*key);
                    }
                }
                "GUARDRAIL_RULE_CACHE_TTL_SECS" => {
                    if let Ok(v) = env[*key].parse() {
                        self.rule_cache_ttl_secs = v;
                        applied.push(*key);
                    }
                }
                "GUARDRAIL_CACHE_TTL_SECS" => {
                    if let Ok(v) = env[*key].parse() {
                        self.cache_ttl_secs = v;
                        applied.push(*key);
                    }
                }
                other => {
                    tracing::warn!(key = other, "hot-reload key whitelisted but unhandled");
                }
            }
        }
        applied
    }

    /// Validate every violation (not just the first) so startup reports the
    /// full list of problems at once (§10.3, §7: "exit non-zero before
    /// serving traffic").
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.session_signing_secret.is_empty() {
            errors.push(ConfigError::Missing("GUARDRAIL_SESSION_SIGNING_SECRET"));
        } else if let Err(err) = validate_signing_secret(&self.session_signing_secret) {
            errors.push(ConfigError::Invalid(format!(
                "session signing secret: {err}"
            )));
        }

        for (key, value, name) in [
            ("GUARDRAIL_IDE_API_KEY", &self.ide_api_key, "IDE API key"),
            ("GUARDRAIL_MCP_API_KEY", &self.mcp_api_key, "MCP API key"),
        ] {
            if value.is_empty() {
                errors.push(ConfigError::Missing(key));
            } else if value.len() < MIN_SECRET_LEN {
                errors.push(ConfigError::Invalid(format!(
                    "{name} must be at least {MIN_SECRET_LEN} characters"
                )));
            } else if let Err(err) = validate_signing_secret(value) {
                errors.push(ConfigError::Invalid(format!("{name}: {err}")));
            }
        }

        if self.rule_store_dsn.is_empty() {
            errors.push(ConfigError::Missing("GUARDRAIL_RULE_STORE_DSN"));
        }
        if self.cache_address.is_empty() {
            errors.push(ConfigError::Missing("GUARDRAIL_CACHE_ADDRESS"));
        }
        if self.queue_capacity == 0 {
            errors.push(ConfigError::Invalid(
                "GUARDRAIL_QUEUE_CAPACITY must be non-zero".to_string(),
            ));
        }

        errors
    }

    pub fn rule_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rule_cache_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    /// An 8-hex-char BLAKE3 prefix, safe to log in place of a secret value
    /// (§10.1: "short truncated hash").
    pub fn redacted_secret_hash(secret: &str) -> String {
        blake3::hash(secret.as_bytes()).to_hex()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_secret() -> String {
        "Sup3r-Secret-Value-1234567890!!".to_string()
    }

    #[test]
    fn default_config_fails_validation_on_missing_required_fields() {
        let config = Config::default();
        let errors = config.validate();
        assert!(!errors.is_empty());
    }

    #[test]
    fn fully_configured_instance_validates_clean() {
        let config = Config {
            session_signing_secret: strong_secret(),
            ide_api_key: strong_secret(),
            mcp_api_key: strong_secret(),
            rule_store_dsn: "postgres://localhost/guardrail".to_string(),
            cache_address: "redis://localhost".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validate_reports_every_violation_not_just_first() {
        let config = Config::default();
        let errors = config.validate();
        assert!(errors.len() >= 4);
    }

    #[test]
    fn env_overrides_defaults() {
        let mut config = Config::default();
        let mut env = HashMap::new();
        env.insert("GUARDRAIL_LISTEN_ADDR".to_string(), "127.0.0.1:9000".to_string());
        env.insert("GUARDRAIL_QUEUE_CAPACITY".to_string(), "128".to_string());
        config.apply_env(&env);
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.queue_capacity, 128);
    }

    #[test]
    fn reload_only_touches_whitelisted_keys() {
        let mut config = Config::default();
        let mut env = HashMap::new();
        env.insert("GUARDRAIL_LOG_LEVEL".to_string(), "debug".to_string());
        env.insert("GUARDRAIL_RULE_STORE_DSN".to_string(), "postgres://evil".to_string());
        let applied = config.reload(&env);
        assert_eq!(applied, vec!["GUARDRAIL_LOG_LEVEL"]);
        assert_eq!(config.log_level, "debug");
        assert!(config.rule_store_dsn.is_empty());
    }

    #[test]
    fn redacted_secret_hash_is_eight_hex_chars_and_deterministic() {
        let hash_a = Config::redacted_secret_hash("my-secret-value");
        let hash_b = Config::redacted_secret_hash("my-secret-value");
        assert_eq!(hash_a.len(), 8);
        assert_eq!(hash_a, hash_b);
    }
}
