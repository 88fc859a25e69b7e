// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Control-plane host for a multi-threaded conversational agent system.
#[derive(Debug, Parser)]
#[command(name = "threadhost", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "THREADHOST_PORT", default_value = "8787")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "THREADHOST_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Comma-separated list of allowed CORS origins. `*` allows any origin.
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Path to the durable SQLite store. Defaults to an XDG state path.
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Maximum number of agent invocations running concurrently.
    #[arg(long, env = "MAINTHREAD_MAX_AGENTS", default_value = "10")]
    pub max_agents: usize,

    /// Hard timeout for a single agent turn, in seconds.
    #[arg(long, env = "MAINTHREAD_AGENT_TIMEOUT", default_value = "1800")]
    pub agent_timeout_secs: u64,

    /// Additional retry attempts after a driver crash, with session resumption.
    #[arg(long, env = "MAINTHREAD_MAX_RETRIES", default_value = "2")]
    pub max_retries: u32,

    /// Optional driver-side response cache.
    #[arg(long, env = "CACHE_ENABLED", default_value = "false")]
    pub cache_enabled: bool,

    /// Maximum clients sharing the driver cache.
    #[arg(long, env = "CACHE_MAX_CLIENTS", default_value = "4")]
    pub cache_max_clients: usize,

    /// TTL for cached driver responses, in seconds.
    #[arg(long, env = "CACHE_TTL_SECONDS", default_value = "300")]
    pub cache_ttl_secs: u64,

    /// Retention window for persisted events, in hours.
    #[arg(long, env = "THREADHOST_EVENT_RETENTION_HOURS", default_value = "24")]
    pub event_retention_hours: u64,

    /// Watchdog scan interval, in seconds.
    #[arg(long, env = "THREADHOST_WATCHDOG_INTERVAL", default_value = "15")]
    pub watchdog_interval_secs: u64,

    /// Housekeeper trim interval, in seconds.
    #[arg(long, env = "THREADHOST_HOUSEKEEPER_INTERVAL", default_value = "3600")]
    pub housekeeper_interval_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "THREADHOST_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "THREADHOST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Bearer token for API authentication. Unset disables auth (dev only).
    #[arg(long, env = "THREADHOST_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Command spawned once per turn to run the agent driver itself; reads a
    /// `TurnRequest` JSON line on stdin and writes one `AgentEvent` JSON line
    /// per event on stdout.
    #[arg(long, env = "THREADHOST_AGENT_COMMAND", default_value = "threadhost-agent")]
    pub agent_command: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_agents == 0 {
            anyhow::bail!("--max-agents must be at least 1");
        }
        if self.agent_timeout_secs == 0 {
            anyhow::bail!("--agent-timeout-secs must be positive");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn event_retention(&self) -> Duration {
        Duration::from_secs(self.event_retention_hours * 3600)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn housekeeper_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeper_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Resolve the database path, defaulting to an XDG state directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        let state_home = std::env::var("XDG_STATE_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_default();
            format!("{home}/.local/state")
        });
        PathBuf::from(state_home).join("threadhost").join("threadhost.db")
    }

    /// Parsed list of allowed CORS origins. `["*"]` means any origin.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
