use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Shortest allowed interval between two refreshes in watch mode.
pub const MIN_REFRESH_SECS: u64 = 5;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl FeedConfig {
    fn new(base_url: &str, timeout_ms: u64) -> Self {
        FeedConfig {
            base_url: base_url.to_string(),
            timeout_ms,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_estimate() -> FeedConfig {
    FeedConfig::new("https://fundgz.1234567.com.cn", 5000)
}

fn default_search() -> FeedConfig {
    FeedConfig::new("https://fundsuggest.eastmoney.com", 3000)
}

fn default_quote() -> FeedConfig {
    FeedConfig::new("https://qt.gtimg.cn", 4000)
}

fn default_archive() -> FeedConfig {
    FeedConfig::new("https://fundf10.eastmoney.com", 5000)
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    /// Intraday valuation estimates
    #[serde(default = "default_estimate")]
    pub estimate: FeedConfig,
    /// Fund search and name suggestions
    #[serde(default = "default_search")]
    pub search: FeedConfig,
    /// Settled fund NAV and live stock quotes
    #[serde(default = "default_quote")]
    pub quote: FeedConfig,
    /// Holdings reports and historical NAV
    #[serde(default = "default_archive")]
    pub archive: FeedConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            estimate: default_estimate(),
            search: default_search(),
            quote: default_quote(),
            archive: default_archive(),
        }
    }
}

impl ProvidersConfig {
    /// Points every feed at the same host, keeping default deadlines.
    pub fn with_base_url(base_url: &str) -> Self {
        let mut providers = ProvidersConfig::default();
        for feed in [
            &mut providers.estimate,
            &mut providers.search,
            &mut providers.quote,
            &mut providers.archive,
        ] {
            feed.base_url = base_url.to_string();
        }
        providers
    }
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Shanghai
}

fn default_refresh_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Fund codes tracked when none are given on the command line
    #[serde(default)]
    pub funds: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Trading calendar timezone, used to decide what "today" is
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            funds: Vec::new(),
            providers: ProvidersConfig::default(),
            timezone: default_timezone(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl AppConfig {
    /// Loads the config at `path`, or the default location when it exists.
    ///
    /// An explicit path must exist. Without one, a missing default file gives
    /// the built-in defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }
        let default_path = Self::default_config_path()?;
        if default_path.exists() {
            Self::load_from_path(&default_path)
        } else {
            debug!(
                "No config at {}, using defaults",
                default_path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("cn", "fundwatch", "fundwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(MIN_REFRESH_SECS))
    }
}
