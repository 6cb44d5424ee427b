//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (set by most deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_AUDIO__FINAL_TIMEOUT_MS`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore so that field names containing a
//! single underscore (`final_timeout_ms`) stay intact.

use crate::audio::{IncrementalBufferConfig, PartialStrategy};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub questions: QuestionsConfig,
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
}

/// Where the HTTP server listens.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any interface (containers, production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which implementation answers affect-analysis requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectBackend {
    /// Remote analysis service
    Http,
    /// Built-in rule-based analyzer
    Local,
}

/// The remote analysis service (transcription, scoring, summaries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub base_url: String,

    /// Sent as a bearer token when non-empty
    #[serde(default)]
    pub api_key: String,

    /// Only the connection attempt is bounded; analysis calls may run long
    pub connect_timeout_ms: u64,

    pub affect_backend: AffectBackend,
}

impl ServicesConfig {
    pub fn api_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    /// TOML file of `[[questions]]` records
    pub bank_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialStrategyKind {
    Overlapping,
    NewChunksOnly,
}

/// Incremental transcription tuning.
///
/// ## Trade-offs:
/// - Lower `incremental_threshold`: livelier captions, more transcription calls
/// - Higher `final_timeout_ms`: fewer answers cut off mid-pause, slower feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fragments required between partial transcription attempts
    pub incremental_threshold: usize,

    /// Silence that ends an utterance
    pub final_timeout_ms: u64,

    pub partial_strategy: PartialStrategyKind,

    /// Already-transcribed fragments repeated at the start of a partial
    pub overlap_fragments: usize,

    /// How often each connection checks for the silence timeout
    pub flush_check_interval_ms: u64,
}

impl AudioConfig {
    pub fn buffer_config(&self) -> IncrementalBufferConfig {
        let strategy = match self.partial_strategy {
            PartialStrategyKind::Overlapping => PartialStrategy::Overlapping {
                overlap_fragments: self.overlap_fragments,
            },
            PartialStrategyKind::NewChunksOnly => PartialStrategy::NewChunksOnly,
        };

        IncrementalBufferConfig {
            incremental_threshold: self.incremental_threshold,
            final_timeout: Duration::from_millis(self.final_timeout_ms),
            strategy,
        }
    }

    pub fn flush_check_interval(&self) -> Duration {
        Duration::from_millis(self.flush_check_interval_ms)
    }
}

/// Limits and connection keep-alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,

    /// How often the server pings each WebSocket client
    pub heartbeat_interval_secs: u64,

    /// A client silent for this long is disconnected
    pub client_timeout_secs: u64,
}

impl PerformanceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            services: ServicesConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                api_key: String::new(),
                connect_timeout_ms: 5_000,
                affect_backend: AffectBackend::Http,
            },
            questions: QuestionsConfig {
                bank_path: "questions.toml".to_string(),
            },
            audio: AudioConfig {
                incremental_threshold: 5,
                final_timeout_ms: 2_000,
                partial_strategy: PartialStrategyKind::Overlapping,
                overlap_fragments: 2,
                flush_check_interval_ms: 250,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 100,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_SERVICES__BASE_URL=http://analysis:8000`: Point at another analysis service
    /// - `APP_SERVICES__AFFECT_BACKEND=local`: Use the built-in affect analyzer
    /// - `HOST=0.0.0.0`, `PORT=3000`: Deployment platform conventions
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject values that would leave the server unable to run.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        let base_url = self.services.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("Service base URL must start with http:// or https://"));
        }

        if self.services.connect_timeout_ms == 0 {
            return Err(anyhow!("Service connect timeout must be greater than 0"));
        }

        if self.questions.bank_path.trim().is_empty() {
            return Err(anyhow!("Question bank path cannot be empty"));
        }

        if self.audio.incremental_threshold == 0 {
            return Err(anyhow!("Incremental threshold must be greater than 0"));
        }

        if self.audio.final_timeout_ms == 0 {
            return Err(anyhow!("Final timeout must be greater than 0"));
        }

        if self.audio.flush_check_interval_ms == 0 {
            return Err(anyhow!("Flush check interval must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.heartbeat_interval_secs == 0 {
            return Err(anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs {
            return Err(anyhow!("Client timeout must be longer than the heartbeat interval"));
        }

        Ok(())
    }

    /// Apply a partial update from JSON, e.g. `{"audio": {"final_timeout_ms": 3000}}`.
    ///
    /// Only the fields present are changed, and the result must still pass
    /// validation. Audio and keep-alive settings take effect on the next
    /// connection; server and service settings on the next restart.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;
        let mut updated = self.clone();

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                updated.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                updated.server.port = u16::try_from(port).map_err(|_| anyhow!("Server port out of range"))?;
            }
        }

        if let Some(services) = partial.get("services") {
            if let Some(base_url) = services.get("base_url").and_then(|v| v.as_str()) {
                updated.services.base_url = base_url.to_string();
            }
            if let Some(timeout) = services.get("connect_timeout_ms").and_then(|v| v.as_u64()) {
                updated.services.connect_timeout_ms = timeout;
            }
            if let Some(backend) = services.get("affect_backend") {
                updated.services.affect_backend = serde_json::from_value(backend.clone())?;
            }
        }

        if let Some(audio) = partial.get("audio") {
            if let Some(threshold) = audio.get("incremental_threshold").and_then(|v| v.as_u64()) {
                updated.audio.incremental_threshold = threshold as usize;
            }
            if let Some(timeout) = audio.get("final_timeout_ms").and_then(|v| v.as_u64()) {
                updated.audio.final_timeout_ms = timeout;
            }
            if let Some(strategy) = audio.get("partial_strategy") {
                updated.audio.partial_strategy = serde_json::from_value(strategy.clone())?;
            }
            if let Some(overlap) = audio.get("overlap_fragments").and_then(|v| v.as_u64()) {
                updated.audio.overlap_fragments = overlap as usize;
            }
            if let Some(interval) = audio.get("flush_check_interval_ms").and_then(|v| v.as_u64()) {
                updated.audio.flush_check_interval_ms = interval;
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                updated.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(heartbeat) = performance.get("heartbeat_interval_secs").and_then(|v| v.as_u64()) {
                updated.performance.heartbeat_interval_secs = heartbeat;
            }
            if let Some(timeout) = performance.get("client_timeout_secs").and_then(|v| v.as_u64()) {
                updated.performance.client_timeout_secs = timeout;
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Copy safe to return from the config endpoint.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.services.api_key.is_empty() {
            config.services.api_key = "********".to_string();
        }
        config
    }
}
