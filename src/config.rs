//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.trackcheck/config.toml` (user)
//! 3. `/etc/trackcheck/config.toml` (system)
//! 4. built-in defaults
//!
//! Catalog credentials are loaded separately with mandatory permission checks:
//! 1. `~/.trackcheck/secrets.toml` (user, must be 0600)
//! 2. `/etc/trackcheck/secrets.toml` (system, must be 0600)
//! 3. `TRACKCHECK_CLIENT_ID` / `TRACKCHECK_CLIENT_SECRET` environment variables

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::providers::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URL, RetryConfig};
use crate::{Result, TrackcheckError};

const CLIENT_ID_ENV: &str = "TRACKCHECK_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "TRACKCHECK_CLIENT_SECRET";

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Catalog endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Catalog API base URL (default: https://api.spotify.com/v1).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// OAuth token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Match and comparison tolerances.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Minimum composite score for a match (default: 0.7).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Durations within this many ms are OK (default: 1000).
    #[serde(default = "default_length_tolerance")]
    pub length_tolerance_ms: u64,
    /// Durations within this many ms are a warning, beyond it an error (default: 5000).
    #[serde(default = "default_warning_tolerance")]
    pub warning_tolerance_ms: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            length_tolerance_ms: default_length_tolerance(),
            warning_tolerance_ms: default_warning_tolerance(),
        }
    }
}

fn default_threshold() -> f64 {
    crate::matching::DEFAULT_MATCH_THRESHOLD
}

fn default_length_tolerance() -> u64 {
    1000
}

fn default_warning_tolerance() -> u64 {
    5000
}

/// `[cache]` section. Sizes in bytes, times in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Entry lifetime; absent means entries never expire.
    pub max_age_ms: Option<u64>,
    pub max_size_bytes: usize,
    pub cleanup_threshold_bytes: usize,
    pub min_remaining_bytes: usize,
    pub flush_delay_ms: u64,
    /// Storage directory (default: platform cache dir + `/trackcheck`).
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            enabled: defaults.enabled,
            max_age_ms: defaults.max_age.map(|d| d.as_millis() as u64),
            max_size_bytes: defaults.max_size_bytes,
            cleanup_threshold_bytes: defaults.cleanup_threshold_bytes,
            min_remaining_bytes: defaults.min_remaining_bytes,
            flush_delay_ms: defaults.flush_delay.as_millis() as u64,
            dir: None,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        let config = CacheConfig::new()
            .enabled(settings.enabled)
            .max_size_bytes(settings.max_size_bytes)
            .cleanup_threshold_bytes(settings.cleanup_threshold_bytes)
            .min_remaining_bytes(settings.min_remaining_bytes)
            .flush_delay(Duration::from_millis(settings.flush_delay_ms));
        match settings.max_age_ms {
            Some(ms) => config.max_age(Duration::from_millis(ms)),
            None => config.no_expiry(),
        }
    }
}

/// `[retry]` section. Times in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_ms: 500,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_retries(settings.max_retries)
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .jitter(Duration::from_millis(settings.jitter_ms))
    }
}

impl Config {
    /// Load and validate configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing standard
    /// file is used, and built-in defaults apply if there is none.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            TrackcheckError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            TrackcheckError::Configuration(msg) => {
                TrackcheckError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            TrackcheckError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path; `None` means use defaults.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(TrackcheckError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".trackcheck").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/trackcheck/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.threshold) {
            return Err(TrackcheckError::Configuration(format!(
                "matching.threshold must be within [0, 1], got {}",
                m.threshold
            )));
        }
        if m.warning_tolerance_ms < m.length_tolerance_ms {
            return Err(TrackcheckError::Configuration(format!(
                "matching.warning_tolerance_ms ({}) is below length_tolerance_ms ({})",
                m.warning_tolerance_ms, m.length_tolerance_ms
            )));
        }
        self.cache_config().validate()?;
        self.retry_config().validate()
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }
}

/// Secrets configuration (catalog client credentials).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub catalog: Option<ClientSecret>,
}

/// OAuth client credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (credentials may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".trackcheck").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/trackcheck/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            TrackcheckError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            TrackcheckError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            TrackcheckError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(TrackcheckError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Client id and secret, falling back to the environment.
    pub fn client_credentials(&self) -> Option<(String, String)> {
        if let Some(secret) = &self.catalog {
            return Some((secret.client_id.clone(), secret.client_secret.clone()));
        }
        let id = std::env::var(CLIENT_ID_ENV).ok()?;
        let secret = std::env::var(CLIENT_SECRET_ENV).ok()?;
        Some((id, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://api.spotify.com/v1");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.matching.threshold, 0.7);
        assert_eq!(config.matching.length_tolerance_ms, 1000);
        assert_eq!(config.matching.warning_tolerance_ms, 5000);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_age_ms, None);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
            [matching]
            threshold = 0.8

            [cache]
            max_age_ms = 86400000

            [retry]
            jitter_ms = 0
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.matching.threshold, 0.8);
        assert_eq!(config.matching.length_tolerance_ms, 1000);
        assert_eq!(config.cache_config().max_age, Some(Duration::from_secs(86_400)));
        assert_eq!(config.retry_config().jitter, Duration::ZERO);
        assert_eq!(config.retry_config().max_retries, 3);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = Config::from_toml_str("[matching]\nthreshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn rejects_inverted_tolerances() {
        let toml = "[matching]\nlength_tolerance_ms = 6000\nwarning_tolerance_ms = 5000\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_inconsistent_cache_sizes() {
        let toml = "[cache]\nmax_size_bytes = 1000\ncleanup_threshold_bytes = 2000\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_inverted_retry_delays() {
        let toml = "[retry]\ninitial_delay_ms = 5000\nmax_delay_ms = 100\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/trackcheck.toml"))).is_err());
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api]\ntimeout_secs = 5\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.api.timeout_secs, 5);
    }

    #[cfg(unix)]
    #[test]
    fn secrets_permissions_are_enforced() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[catalog]\nclient_id = \"id\"\nclient_secret = \"secret\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(Secrets::load_from_file(&path).is_err());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(
            secrets.client_credentials(),
            Some(("id".to_string(), "secret".to_string()))
        );
    }
}
