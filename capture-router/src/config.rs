//! Configuration management for the capture pipeline.
//!
//! Loads configuration from TOML files and provides runtime defaults.
//! Thresholds and windows are tunable here on purpose; none of them are
//! load-bearing invariants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub screenshot: ScreenshotConfig,

    #[serde(default)]
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the pipeline is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Unix socket the daemon listens on for page-context messages
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            socket_path: default_socket_path(),
        }
    }
}

/// Dedup windows per deployment point. Each context owns its own filter;
/// these only set the window widths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Page-side window against double DOM events
    #[serde(default = "default_page_window")]
    pub page_window_ms: u64,

    /// Panel-side window against duplicate renders
    #[serde(default = "default_panel_window")]
    pub panel_window_ms: u64,

    /// Background/store-side window against duplicate captures
    #[serde(default = "default_store_window")]
    pub store_window_ms: u64,

    /// Router-level expiry for inbound message identity hashes
    #[serde(default = "default_message_expiry")]
    pub message_expiry_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            page_window_ms: 1_000,
            panel_window_ms: 5_000,
            store_window_ms: 10_000,
            message_expiry_ms: 10_000,
        }
    }
}

impl DedupConfig {
    pub fn page_window(&self) -> Duration {
        Duration::from_millis(self.page_window_ms)
    }

    pub fn panel_window(&self) -> Duration {
        Duration::from_millis(self.panel_window_ms)
    }

    pub fn store_window(&self) -> Duration {
        Duration::from_millis(self.store_window_ms)
    }

    pub fn message_expiry(&self) -> Duration {
        Duration::from_millis(self.message_expiry_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Maximum retained records
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Key-value entry holding the record array
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Grace period during which appends are refused after a clear
    #[serde(default = "default_clear_grace")]
    pub clear_grace_ms: u64,

    /// SQLite database location; defaults next to the platform data dir
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_records: 100,
            storage_key: default_storage_key(),
            clear_grace_ms: 2_000,
            db_path: None,
        }
    }
}

impl StoreSettings {
    pub fn store_config(&self) -> capture_store::StoreConfig {
        capture_store::StoreConfig {
            storage_key: self.storage_key.clone(),
            max_records: self.max_records,
            clear_grace: Duration::from_millis(self.clear_grace_ms),
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("capture-router")
                .join("captures.db")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Structural selectors probed in order for the main content region
    #[serde(default = "default_main_content_selectors")]
    pub main_content_selectors: Vec<String>,

    /// Minimum serialized size for a candidate region to be accepted
    #[serde(default = "default_min_main_content_len")]
    pub min_main_content_len: usize,

    /// Excerpt length carried in record metadata
    #[serde(default = "default_excerpt_len")]
    pub excerpt_len: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            main_content_selectors: default_main_content_selectors(),
            min_main_content_len: 500,
            excerpt_len: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Minimum spacing between attempts
    #[serde(default = "default_screenshot_cooldown")]
    pub cooldown_ms: u64,

    /// Overall deadline after which an attempt is abandoned
    #[serde(default = "default_screenshot_timeout")]
    pub timeout_ms: u64,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1_000,
            timeout_ms: 15_000,
        }
    }
}

impl ScreenshotConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Linear backoff unit for retryable sends
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Retries after the initial attempt, retryable kinds only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pacing between sends when replaying stored captures to the panel
    #[serde(default = "default_replay_spacing")]
    pub replay_spacing_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 200,
            max_retries: 2,
            replay_spacing_ms: 50,
        }
    }
}

impl RouterConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn replay_spacing(&self) -> Duration {
        Duration::from_millis(self.replay_spacing_ms)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/capture-router.sock")
}

fn default_page_window() -> u64 {
    1_000
}

fn default_panel_window() -> u64 {
    5_000
}

fn default_store_window() -> u64 {
    10_000
}

fn default_message_expiry() -> u64 {
    10_000
}

fn default_max_records() -> usize {
    100
}

fn default_storage_key() -> String {
    "captures.v1".to_string()
}

fn default_clear_grace() -> u64 {
    2_000
}

fn default_main_content_selectors() -> Vec<String> {
    vec![
        "main".to_string(),
        "article".to_string(),
        "[role=\"main\"]".to_string(),
        "#content".to_string(),
        ".content".to_string(),
        ".post-content".to_string(),
        ".article-body".to_string(),
        "#main".to_string(),
    ]
}

fn default_min_main_content_len() -> usize {
    500
}

fn default_excerpt_len() -> usize {
    300
}

fn default_screenshot_cooldown() -> u64 {
    1_000
}

fn default_screenshot_timeout() -> u64 {
    15_000
}

fn default_retry_base_delay() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    2
}

fn default_replay_spacing() -> u64 {
    50
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capture-router")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
