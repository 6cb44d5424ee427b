//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket connection.
//!
//! ## Sharing Pattern:
//! - **config / metrics**: `Arc<RwLock<T>>`, many readers or one writer.
//!   Lock hold times are a field copy or a counter bump, so a plain
//!   `std::sync::RwLock` is enough.
//! - **conversation / transcription**: `Arc<T>` of types that do their own
//!   internal locking.
//!
//! A poisoned lock only means another thread panicked mid-update of a
//! counter or a config copy; the data is still usable, so poisoning is
//! recovered rather than propagated.

use crate::config::AppConfig;
use crate::conversation::ConversationOrchestrator;
use crate::transcription::TranscriptionEngine;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Runtime-updatable configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// HTTP and connection counters, updated by middleware and the WebSocket actor
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Interview state machine shared by every connection
    pub conversation: Arc<ConversationOrchestrator>,

    /// Speech-to-text with partial/final semantics
    pub transcription: Arc<TranscriptionEngine>,

    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and WebSocket connections.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Open interview WebSocket connections
    pub active_connections: u32,

    /// Keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        conversation: Arc<ConversationOrchestrator>,
        transcription: Arc<TranscriptionEngine>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            conversation,
            transcription,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration. The lock is released on return.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the configuration if the new one validates.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = new_config;
        Ok(())
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner).request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner).error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn connection_opened(&self) {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner).active_connections += 1;
    }

    /// Saturates at zero.
    pub fn connection_closed(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_connections = metrics.active_connections.saturating_sub(1);
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

/// State wired to local adapters and an unreachable analysis service.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::ports::{HttpAnalysisService, QuestionBank, RuleBasedAffectAnalyzer};
    use crate::session::SessionStore;
    use std::time::Duration;

    let config = AppConfig::default();
    let service = Arc::new(
        HttpAnalysisService::new("http://127.0.0.1:9", None, Duration::from_millis(50))
            .expect("client builds"),
    );
    let bank = QuestionBank::from_toml_str(include_str!("../questions.toml")).expect("bank parses");

    let conversation = Arc::new(ConversationOrchestrator::new(
        SessionStore::new(config.performance.max_concurrent_sessions),
        Arc::new(bank),
        service.clone(),
        Arc::new(RuleBasedAffectAnalyzer::new()),
        service.clone(),
    ));
    let transcription = Arc::new(TranscriptionEngine::new(service));
    AppState::new(config, conversation, transcription)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_connection_counter_saturates() {
        let state = test_state();
        state.connection_opened();
        state.connection_closed();
        state.connection_closed();
        assert_eq!(state.get_metrics_snapshot().active_connections, 0);
    }

    #[test]
    fn test_update_config_validates() {
        let state = test_state();
        let mut config = state.get_config();
        config.server.port = 0;
        assert!(state.update_config(config).is_err());
        assert_eq!(state.get_config().server.port, 8080);
    }
}
