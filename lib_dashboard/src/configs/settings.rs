use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Category;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("capacity for {0} events must be greater than zero")]
    ZeroCapacity(Category),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("queue size '{0}' must be greater than zero")]
    ZeroQueue(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// STOMP-over-WebSocket endpoint of the dashboard backend.
    pub push_url: String,
    /// Base URL the REST snapshot paths are joined to.
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub pipeline_capacity: usize,
    pub healing_capacity: usize,
    pub security_capacity: usize,
    /// Depth of the store's command queue.
    pub command_queue_size: usize,
    /// Depth of each resource listener's queue.
    pub listener_queue_size: usize,
    /// Restrict REST snapshots to one repository (`owner/repo`).
    pub repo_filter: Option<String>,
    pub branch_filter: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            push_url: "ws://localhost:8083/ws/websocket".to_string(),
            api_base_url: "http://localhost:8080/".to_string(),
            api_token: None,
            reconnect_delay_ms: 5000,
            poll_interval_ms: 10_000,
            pipeline_capacity: Category::Pipeline.default_capacity(),
            healing_capacity: Category::Healing.default_capacity(),
            security_capacity: Category::Security.default_capacity(),
            command_queue_size: 1024,
            listener_queue_size: 64,
            repo_filter: None,
            branch_filter: None,
        }
    }
}

impl SyncSettings {
    pub fn capacity(&self, category: Category) -> usize {
        match category {
            Category::Pipeline => self.pipeline_capacity,
            Category::Healing => self.healing_capacity,
            Category::Security => self.security_capacity,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(c) = Category::ALL.into_iter().find(|c| self.capacity(*c) == 0) {
            return Err(SettingsError::ZeroCapacity(c));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(SettingsError::ZeroDuration("reconnectDelayMs"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::ZeroDuration("pollIntervalMs"));
        }
        if self.command_queue_size == 0 {
            return Err(SettingsError::ZeroQueue("commandQueueSize"));
        }
        if self.listener_queue_size == 0 {
            return Err(SettingsError::ZeroQueue("listenerQueueSize"));
        }
        Ok(())
    }
}
