//! Configuration schema definitions

use crate::bus::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for tgm
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram side configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Mumble side configuration
    #[serde(default)]
    pub mumble: MumbleConfig,
    /// Bridge core configuration
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token
    #[serde(default)]
    pub bot_key: String,
    /// Private chat of the bot owner
    #[serde(default)]
    pub owner_id: i64,
    /// Group chat that receives join/leave notices
    #[serde(default)]
    pub group_id: i64,
    /// Seconds a `/who` request waits for its answer before it is forgotten
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_key: String::new(),
            owner_id: 0,
            group_id: 0,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TelegramConfig {
    /// Whether messages from `chat_id` are accepted
    pub fn is_bridged_chat(&self, chat_id: i64) -> bool {
        chat_id == self.owner_id || chat_id == self.group_id
    }
}

/// Murmur gRPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MumbleConfig {
    /// gRPC endpoint, e.g. `http://127.0.0.1:50051`
    #[serde(default = "default_grpc_address")]
    pub grpc_address: String,
    /// Virtual server to bridge; the first one reported is used when unset
    #[serde(default)]
    pub server_id: Option<u32>,
}

fn default_grpc_address() -> String {
    "http://127.0.0.1:50051".to_string()
}

impl Default for MumbleConfig {
    fn default() -> Self {
        Self {
            grpc_address: default_grpc_address(),
            server_id: None,
        }
    }
}

/// Bridge core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Capacity of each cross-event queue; writes beyond it are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}
