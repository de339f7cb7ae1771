use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port engines connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Maximum number of simultaneously open engine connections.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Largest inbound packet accepted, in bytes.
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,
}

fn default_port() -> u16 {
    9000
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_max_sessions() -> usize {
    8
}
fn default_max_packet_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            max_sessions: default_max_sessions(),
            max_packet_bytes: default_max_packet_bytes(),
        }
    }
}

/// Handshake and session behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// IDE key an engine must offer.
    #[serde(default = "default_idekey")]
    pub idekey: String,
    /// Language an engine must debug.
    #[serde(default = "default_language")]
    pub language: String,
    /// Cap on outstanding transactions.
    #[serde(default = "default_max_pending")]
    pub max_pending_transactions: usize,
    /// Send breakpoint files as `file://` URIs instead of plain paths.
    #[serde(default)]
    pub file_uris: bool,
}

fn default_idekey() -> String {
    "xdebug".to_string()
}
fn default_language() -> String {
    "PHP".to_string()
}
fn default_max_pending() -> usize {
    1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idekey: default_idekey(),
            language: default_language(),
            max_pending_transactions: default_max_pending(),
            file_uris: false,
        }
    }
}

/// Controller/transport channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Slots per bridge direction.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    256
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Log file; defaults to the platform log directory.
    pub file: Option<PathBuf>,
}

/// A breakpoint seeded at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointEntry {
    /// Script path as the editor names it.
    pub file: String,
    /// One-based line.
    pub line: u32,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session behaviour.
    #[serde(default)]
    pub session: SessionConfig,
    /// Bridge channel settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Breakpoints set on every new session.
    #[serde(default, rename = "breakpoint")]
    pub breakpoints: Vec<BreakpointEntry>,
    /// Log every packet and command verbatim.
    #[serde(default)]
    pub debug: bool,
}
