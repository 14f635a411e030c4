use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default backend location used when `RESUMELENS_SERVICE_URL` is not set.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
/// Default bound on the backend health probe.
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;
/// Default retrieval breadth sent with every chat query.
pub const DEFAULT_CHAT_TOP_K: usize = 8;
/// Default cadence of the session expiry check.
pub const DEFAULT_EXPIRY_CHECK_MS: u64 = 1_000;
/// Default directory holding the persisted session identifier.
pub const DEFAULT_STATE_DIR: &str = ".resumelens";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ResumeLens client core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the retrieval/generation backend.
    pub service_url: String,
    /// Upper bound on the backend health probe, in milliseconds.
    pub health_timeout_ms: u64,
    /// Retrieval breadth used when a chat send does not specify one.
    pub chat_top_k: usize,
    /// Interval between passive session expiry checks, in milliseconds.
    pub expiry_check_ms: u64,
    /// Directory where the active session id is persisted.
    pub state_dir: PathBuf,
    /// Whether consumers should render chunk previews after ingestion.
    pub enable_chunk_preview: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            chat_top_k: DEFAULT_CHAT_TOP_K,
            expiry_check_ms: DEFAULT_EXPIRY_CHECK_MS,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            enable_chunk_preview: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let chat_top_k = parse_optional("RESUMELENS_CHAT_TOP_K")?.unwrap_or(defaults.chat_top_k);
        if chat_top_k == 0 {
            return Err(ConfigError::InvalidValue("RESUMELENS_CHAT_TOP_K".into()));
        }
        let expiry_check_ms =
            parse_optional("RESUMELENS_EXPIRY_CHECK_MS")?.unwrap_or(defaults.expiry_check_ms);
        if expiry_check_ms == 0 {
            return Err(ConfigError::InvalidValue("RESUMELENS_EXPIRY_CHECK_MS".into()));
        }

        Ok(Self {
            service_url: load_env_optional("RESUMELENS_SERVICE_URL")
                .unwrap_or(defaults.service_url),
            health_timeout_ms: parse_optional("RESUMELENS_HEALTH_TIMEOUT_MS")?
                .unwrap_or(defaults.health_timeout_ms),
            chat_top_k,
            expiry_check_ms,
            state_dir: load_env_optional("RESUMELENS_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            enable_chunk_preview: load_env_optional("RESUMELENS_ENABLE_CHUNK_PREVIEW")
                .map(|value| parse_flag("RESUMELENS_ENABLE_CHUNK_PREVIEW", &value))
                .transpose()?
                .unwrap_or(defaults.enable_chunk_preview),
        })
    }

    /// Health probe timeout as a [`Duration`].
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Expiry check cadence as a [`Duration`].
    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_check_ms)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// Returns the installed configuration; a second call returns the first value unchanged.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        service_url = %config.service_url,
        health_timeout_ms = config.health_timeout_ms,
        chat_top_k = config.chat_top_k,
        state_dir = %config.state_dir.display(),
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_contract() {
        let config = Config::default();
        assert_eq!(config.service_url, "http://localhost:8000");
        assert_eq!(config.chat_top_k, 8);
        assert_eq!(config.health_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.expiry_check_interval(), Duration::from_secs(1));
        assert!(!config.enable_chunk_preview);
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(parse_flag("X", " 1 ").unwrap());
        assert!(!parse_flag("X", "off").unwrap());
        let error = parse_flag("X", "maybe").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(name) if name == "X"));
    }

    #[test]
    fn init_config_installs_once() {
        let first = init_config().expect("environment parses");
        let second = init_config().expect("environment parses");
        assert!(std::ptr::eq(first, second));
    }
}
