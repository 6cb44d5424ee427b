//! # Transcription Engine
//!
//! Wraps the transcription port with partial/final semantics and
//! throughput statistics.
//!
//! ## Key Responsibilities:
//! - **Partial transcription**: best effort, failures are swallowed
//! - **Final transcription**: failures become an empty answer, never an error
//! - **Performance monitoring**: request counts, bytes processed, latency

use crate::ports::TranscriptionPort;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Result of a transcription operation.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// The transcribed text (trimmed)
    pub text: String,

    /// Size of the audio that was transcribed
    pub audio_bytes: usize,

    /// Time taken by the transcription service (milliseconds)
    pub processing_time_ms: u64,

    /// Whether this covers a completed utterance
    pub is_final: bool,

    /// Unix timestamp (seconds) when transcription completed
    pub timestamp: u64,
}

/// Performance tracking for the transcription engine.
#[derive(Debug, Default)]
struct EngineMetrics {
    total_requests: u64,
    partial_requests: u64,
    final_requests: u64,
    failed_requests: u64,
    total_audio_bytes: u64,
    total_processing_time: u64,
}

pub struct TranscriptionEngine {
    port: Arc<dyn TranscriptionPort>,
    metrics: RwLock<EngineMetrics>,
}

impl TranscriptionEngine {
    pub fn new(port: Arc<dyn TranscriptionPort>) -> Self {
        Self {
            port,
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    /// Transcribe audio bytes through the port.
    ///
    /// ## Returns:
    /// - **Ok(TranscriptionResult)**: the service answered (text may be empty)
    /// - **Err(anyhow::Error)**: empty input or the service failed
    pub async fn transcribe(&self, audio: &[u8], is_final: bool) -> Result<TranscriptionResult> {
        if audio.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let start_time = Instant::now();
        let outcome = self.port.transcribe(audio).await;
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        self.update_metrics(audio.len(), processing_time_ms, is_final, outcome.is_ok())
            .await;

        let text = outcome?;
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        tracing::debug!(
            "Transcription completed: {} bytes -> {} chars in {}ms (final: {})",
            audio.len(),
            text.len(),
            processing_time_ms,
            is_final
        );

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            audio_bytes: audio.len(),
            processing_time_ms,
            is_final,
            timestamp,
        })
    }

    /// Best-effort transcription of an in-progress utterance. Returns `None`
    /// on failure or when nothing was recognized.
    pub async fn transcribe_partial(&self, audio: &[u8]) -> Option<String> {
        match self.transcribe(audio, false).await {
            Ok(result) if !result.text.is_empty() => Some(result.text),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Partial transcription failed: {:#}", e);
                None
            }
        }
    }

    /// Transcription of a completed utterance. Failures are logged and
    /// produce an empty string.
    pub async fn transcribe_final(&self, audio: &[u8]) -> String {
        match self.transcribe(audio, true).await {
            Ok(result) => result.text,
            Err(e) => {
                tracing::error!("Final transcription failed: {:#}", e);
                String::new()
            }
        }
    }

    async fn update_metrics(&self, audio_bytes: usize, processing_time_ms: u64, is_final: bool, succeeded: bool) {
        let mut metrics = self.metrics.write().await;

        metrics.total_requests += 1;
        metrics.total_audio_bytes += audio_bytes as u64;
        metrics.total_processing_time += processing_time_ms;
        if is_final {
            metrics.final_requests += 1;
        } else {
            metrics.partial_requests += 1;
        }
        if !succeeded {
            metrics.failed_requests += 1;
        }
    }

    /// Get performance statistics for the transcription engine.
    pub async fn get_performance_stats(&self) -> EnginePerformanceStats {
        let metrics = self.metrics.read().await;

        EnginePerformanceStats {
            total_requests: metrics.total_requests,
            partial_requests: metrics.partial_requests,
            final_requests: metrics.final_requests,
            failed_requests: metrics.failed_requests,
            total_audio_bytes: metrics.total_audio_bytes,
            average_processing_time_ms: if metrics.total_requests > 0 {
                metrics.total_processing_time / metrics.total_requests
            } else {
                0
            },
            success_rate: if metrics.total_requests > 0 {
                (metrics.total_requests - metrics.failed_requests) as f32 / metrics.total_requests as f32
            } else {
                0.0
            },
        }
    }
}

/// Performance statistics for the transcription engine.
#[derive(Debug, Clone, Serialize)]
pub struct EnginePerformanceStats {
    pub total_requests: u64,
    pub partial_requests: u64,
    pub final_requests: u64,
    pub failed_requests: u64,
    pub total_audio_bytes: u64,
    pub average_processing_time_ms: u64,
    pub success_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedTranscriber {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl TranscriptionPort for ScriptedTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow!("transcription backend down"))
        }
    }

    fn engine(reply: Option<&'static str>) -> TranscriptionEngine {
        TranscriptionEngine::new(Arc::new(ScriptedTranscriber { reply }))
    }

    #[tokio::test]
    async fn test_transcribe_trims_text() {
        let engine = engine(Some("  I led the migration.  "));
        let result = engine.transcribe(b"abcd", true).await.unwrap();
        assert_eq!(result.text, "I led the migration.");
        assert_eq!(result.audio_bytes, 4);
        assert!(result.is_final);
    }

    #[tokio::test]
    async fn test_empty_audio_is_rejected() {
        let engine = engine(Some("hello"));
        assert!(engine.transcribe(b"", false).await.is_err());
        assert_eq!(engine.get_performance_stats().await.total_requests, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_none() {
        let failing = engine(None);
        assert_eq!(failing.transcribe_partial(b"abcd").await, None);

        let blank = engine(Some("   "));
        assert_eq!(blank.transcribe_partial(b"abcd").await, None);
    }

    #[tokio::test]
    async fn test_final_failure_is_empty_answer() {
        let engine = engine(None);
        assert_eq!(engine.transcribe_final(b"abcd").await, "");

        let stats = engine.get_performance_stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.final_requests, 1);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let engine = engine(Some("words"));
        engine.transcribe_partial(b"ab").await;
        engine.transcribe_final(b"abcd").await;

        let stats = engine.get_performance_stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.partial_requests, 1);
        assert_eq!(stats.final_requests, 1);
        assert_eq!(stats.total_audio_bytes, 6);
        assert_eq!(stats.success_rate, 1.0);
    }
}
