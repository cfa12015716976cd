use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::auth::DEFAULT_EMAIL_DOMAIN;
use crate::duration::deserialize_millis;
use crate::market_data::providers::COINGECKO_API_BASE;
use crate::models::TokenDescriptor;
use crate::store::DEFAULT_HOLDER_KEY;

fn default_freshness_window() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

/// USD per unit of local currency.
fn default_fiat_conversion_rate() -> Decimal {
    Decimal::new(115, 4)
}

/// Price feed and valuation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub api_base_url: String,

    /// How long a fetched price set is served without asking the feed again.
    #[serde(
        rename = "freshness_window_ms",
        default = "default_freshness_window",
        deserialize_with = "deserialize_millis"
    )]
    pub freshness_window: Duration,

    /// How often the poller asks for new prices.
    #[serde(
        rename = "poll_interval_ms",
        default = "default_poll_interval",
        deserialize_with = "deserialize_millis"
    )]
    pub poll_interval: Duration,

    /// USD value of one unit of local currency. Local values are USD / rate.
    pub fiat_conversion_rate: Decimal,

    pub local_currency: String,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            api_base_url: COINGECKO_API_BASE.to_string(),
            freshness_window: default_freshness_window(),
            poll_interval: default_poll_interval(),
            fiat_conversion_rate: default_fiat_conversion_rate(),
            local_currency: "KGS".to_string(),
        }
    }
}

/// Hosted backend connection.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL. Without it the CLI runs against an in-memory backend.
    pub url: Option<String>,
    anon_key: Option<String>,
    /// Appended to usernames to form login emails.
    pub email_domain: String,
}

impl BackendConfig {
    pub fn anon_key(&self) -> Option<SecretString> {
        self.anon_key.clone().map(SecretString::from)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field("email_domain", &self.email_domain)
            .finish()
    }
}

/// Where the holder session is kept between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session directory. If relative, resolved from the config file location.
    /// Defaults to the user cache directory.
    pub dir: Option<PathBuf>,

    /// Storage key of the holder record.
    pub holder_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            holder_key: DEFAULT_HOLDER_KEY.to_string(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prices: PriceConfig,
    pub backend: BackendConfig,
    pub session: SessionConfig,
    /// Static token list, used when no backend is configured.
    pub tokens: Vec<TokenDescriptor>,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prices.fiat_conversion_rate <= Decimal::ZERO {
            anyhow::bail!(
                "prices.fiat_conversion_rate must be positive, got {}",
                self.prices.fiat_conversion_rate
            );
        }
        if self.prices.poll_interval.is_zero() {
            anyhow::bail!("prices.poll_interval_ms must be positive");
        }
        if self.backend.url.is_some() && self.backend.anon_key.is_none() {
            anyhow::bail!("backend.anon_key is required when backend.url is set");
        }
        Ok(())
    }

    /// Resolve the session directory.
    ///
    /// A relative `session.dir` is resolved against `config_dir`; without one
    /// the user cache directory is used.
    pub fn resolve_session_dir(&self, config_dir: &Path) -> Result<PathBuf> {
        match &self.session.dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => Ok(config_dir.join(dir)),
            None => Ok(dirs::cache_dir()
                .context("Could not find cache directory")?
                .join("lethex")
                .join("sessions")),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Config file the values came from (it may not exist).
    pub config_path: PathBuf,
    pub session_dir: PathBuf,
    pub holder_key: String,
    pub prices: PriceConfig,
    pub backend: BackendConfig,
    pub tokens: Vec<TokenDescriptor>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./lethex.toml` if it exists in current directory
/// 2. `~/.local/share/lethex/lethex.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("lethex.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("lethex").join("lethex.toml");
    }

    local_config
}

impl ResolvedConfig {
    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// Relative paths inside the file resolve against the file's directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        let config = Config::load_or_default(&config_path)?;
        let session_dir = config.resolve_session_dir(config_dir)?;

        Ok(Self {
            session_dir,
            holder_key: config.session.holder_key,
            prices: config.prices,
            backend: config.backend,
            tokens: config.tokens,
            config_path,
        })
    }
}
