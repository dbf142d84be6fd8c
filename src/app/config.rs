use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logwatch::WatchConfig;
use crate::metrics::exposition::{Exposition, DEFAULT_LABEL, DEFAULT_METRIC_NAME};

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ログレベル
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log directory settings
    #[serde(default)]
    pub watch: WatchSettings,
    /// Metrics endpoint settings
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// Console printer settings
    #[serde(default)]
    pub console: ConsoleSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            watch: WatchSettings::default(),
            metrics: MetricsSettings::default(),
            console: ConsoleSettings::default(),
        }
    }
}

/// Where the plotter logs live and how often to look at them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Directory the plotter writes its logs to
    pub directory: Option<PathBuf>,
    /// Seconds between directory scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

fn default_scan_interval() -> u64 {
    15
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            directory: None,
            scan_interval_secs: default_scan_interval(),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Serve `/metrics`
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address the endpoint binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    /// Label holding the log file name
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_listen_addr() -> String {
    "127.0.0.1:9808".to_string()
}

fn default_metric_name() -> String {
    DEFAULT_METRIC_NAME.to_string()
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_listen_addr(),
            metric_name: default_metric_name(),
            label: default_label(),
        }
    }
}

impl MetricsSettings {
    pub fn exposition(&self) -> Exposition {
        Exposition {
            metric_name: self.metric_name.clone(),
            label: self.label.clone(),
        }
    }
}

/// Periodic `name: percent` listing on stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_console_enabled")]
    pub enabled: bool,
    /// Seconds between listings
    #[serde(default = "default_console_interval")]
    pub interval_secs: u64,
}

fn default_console_enabled() -> bool {
    true
}

fn default_console_interval() -> u64 {
    30
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_console_enabled(),
            interval_secs: default_console_interval(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み（存在しない場合はデフォルトを作成して保存）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::read_from(path)
        } else {
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                tracing::warn!("Failed to save default config: {}", e);
            }
            Ok(config)
        }
    }

    /// Read the config without creating it. A missing file means defaults.
    pub fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        Ok(config)
    }

    /// 設定ファイルパスを取得
    pub fn config_path() -> Result<PathBuf> {
        // ~/.config/plot-exporter/config.toml を使用
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))?;
        Ok(base_dirs.home_dir().join(".config/plot-exporter/config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Build the watcher configuration. A log directory is required.
    pub fn watch_config(&self) -> Result<WatchConfig> {
        let directory = self
            .watch
            .directory
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No log directory configured (use --directory)"))?;

        Ok(WatchConfig {
            directory,
            scan_interval: Duration::from_secs(self.watch.scan_interval_secs.max(1)),
        })
    }
}
