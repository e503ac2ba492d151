use clap::Parser;
use lib_dashboard::SyncSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_dashboard.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Pipeline healing dashboard live-sync server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "DASHBOARD_PORT", help = "Port to listen on for dashboard clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "DASHBOARD_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "DASHBOARD_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "DASHBOARD_PUSH_URL", help = "STOMP-over-WebSocket endpoint of the backend.")]
    pub push_url: Option<String>,

    #[clap(long, env = "DASHBOARD_API_URL", help = "Base URL of the backend REST API.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "DASHBOARD_API_TOKEN", help = "Bearer token sent with REST requests.")]
    pub api_token: Option<String>,

    #[clap(long, env = "DASHBOARD_RECONNECT_DELAY_MS", help = "Delay in milliseconds between push reconnect attempts.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_POLL_INTERVAL_MS", help = "Interval in milliseconds between REST snapshot refreshes.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "DASHBOARD_PIPELINE_CAPACITY", help = "Maximum pipeline events kept in memory.")]
    pub pipeline_capacity: Option<usize>,

    #[clap(long, env = "DASHBOARD_HEALING_CAPACITY", help = "Maximum healing sessions kept in memory.")]
    pub healing_capacity: Option<usize>,

    #[clap(long, env = "DASHBOARD_SECURITY_CAPACITY", help = "Maximum security findings kept in memory.")]
    pub security_capacity: Option<usize>,

    #[clap(long, env = "DASHBOARD_REPO", help = "Restrict REST snapshots to one repository (owner/repo).")]
    pub repo_filter: Option<String>,

    #[clap(long, env = "DASHBOARD_BRANCH", help = "Restrict REST snapshots to one branch.")]
    pub branch_filter: Option<String>,

    #[clap(long, env = "DASHBOARD_CORS_ORIGIN", help = "Origin allowed to call the HTTP API, or '*'.")]
    pub cors_origin: Option<String>,
}

impl Config {
    // 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            push_url: other.push_url.or(self.push_url),
            api_base_url: other.api_base_url.or(self.api_base_url),
            api_token: other.api_token.or(self.api_token),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            pipeline_capacity: other.pipeline_capacity.or(self.pipeline_capacity),
            healing_capacity: other.healing_capacity.or(self.healing_capacity),
            security_capacity: other.security_capacity.or(self.security_capacity),
            repo_filter: other.repo_filter.or(self.repo_filter),
            branch_filter: other.branch_filter.or(self.branch_filter),
            cors_origin: other.cors_origin.or(self.cors_origin),
        }
    }

    fn defaults() -> Config {
        let settings = SyncSettings::default();
        Config {
            port: Some(9003),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            push_url: Some(settings.push_url),
            api_base_url: Some(settings.api_base_url),
            reconnect_delay_ms: Some(settings.reconnect_delay_ms),
            poll_interval_ms: Some(settings.poll_interval_ms),
            pipeline_capacity: Some(settings.pipeline_capacity),
            healing_capacity: Some(settings.healing_capacity),
            security_capacity: Some(settings.security_capacity),
            cors_origin: Some("http://localhost:3000".to_string()),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(9003)
    }

    pub fn log_dir(&self) -> &Path {
        self.log_dir.as_deref().unwrap_or(Path::new("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Engine settings, with anything left unset taken from the library
    /// defaults.
    pub fn sync_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings::default();
        if let Some(v) = &self.push_url {
            settings.push_url = v.clone();
        }
        if let Some(v) = &self.api_base_url {
            settings.api_base_url = v.clone();
        }
        if let Some(v) = self.reconnect_delay_ms {
            settings.reconnect_delay_ms = v;
        }
        if let Some(v) = self.poll_interval_ms {
            settings.poll_interval_ms = v;
        }
        if let Some(v) = self.pipeline_capacity {
            settings.pipeline_capacity = v;
        }
        if let Some(v) = self.healing_capacity {
            settings.healing_capacity = v;
        }
        if let Some(v) = self.security_capacity {
            settings.security_capacity = v;
        }
        settings.api_token = self.api_token.clone();
        settings.repo_filter = self.repo_filter.clone();
        settings.branch_filter = self.branch_filter.clone();
        settings
    }
}

/// Defaults, then the JSON config file, then environment and CLI.
pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

pub fn load_config_from(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current_config.merge(cli)
}
