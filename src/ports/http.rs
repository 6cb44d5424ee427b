//! # HTTP Analysis Service Client
//!
//! One client for the remote analysis service, implementing the
//! transcription, text-analysis, affect-analysis, and summary ports.
//!
//! ## Endpoints (all `POST`, JSON bodies):
//! - `/v1/transcriptions`: `{audio: base64}` → `{text}`
//! - `/v1/answer-analysis`: answer request → judgment (loosely formatted output tolerated)
//! - `/v1/affect-analysis`: `{features, context}` → `{feedback}`
//! - `/v1/feedback-summary`: `{judgment, insight}` → `{summary}`
//!
//! Only a connect timeout is set. In-flight analysis is never cut short.

use crate::analysis::{parse_text_judgment, AffectFeatures, AffectInsight, TextJudgment};
use crate::ports::{
    AnswerAnalysisRequest, FacialAnalysisPort, SummaryPort, TextAnalysisPort, TranscriptionPort,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct HttpAnalysisService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranscriptionRequest {
    audio: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct AffectRequest<'a> {
    features: &'a AffectFeatures,
    context: String,
}

#[derive(Deserialize)]
struct AffectResponse {
    feedback: String,
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
    judgment: &'a TextJudgment,
    insight: &'a AffectInsight,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

impl HttpAnalysisService {
    pub fn new(base_url: &str, api_key: Option<String>, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and return the raw response text.
    async fn post_text<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", path))?;

        if !status.is_success() {
            return Err(anyhow!("{} returned {}: {}", path, status, text));
        }

        debug!("{} responded with {} bytes", path, text.len());
        Ok(text)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let text = self.post_text(path, body).await?;
        serde_json::from_str(&text).with_context(|| format!("unexpected response body from {}", path))
    }
}

#[async_trait]
impl TranscriptionPort for HttpAnalysisService {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let body = TranscriptionRequest {
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
        };
        let response: TranscriptionResponse = self.post_json("/v1/transcriptions", &body).await?;
        Ok(response.text.trim().to_string())
    }
}

#[async_trait]
impl TextAnalysisPort for HttpAnalysisService {
    async fn analyze_text(&self, request: &AnswerAnalysisRequest) -> Result<TextJudgment> {
        let raw = self.post_text("/v1/answer-analysis", request).await?;
        parse_text_judgment(&raw)
    }
}

#[async_trait]
impl FacialAnalysisPort for HttpAnalysisService {
    async fn analyze_affect(&self, features: &AffectFeatures, trends: Option<&str>) -> Result<AffectInsight> {
        let body = AffectRequest {
            features,
            context: affect_context(features, trends),
        };
        let response: AffectResponse = self.post_json("/v1/affect-analysis", &body).await?;
        Ok(AffectInsight::new(response.feedback.trim()))
    }
}

#[async_trait]
impl SummaryPort for HttpAnalysisService {
    async fn summarize(&self, judgment: &TextJudgment, insight: &AffectInsight) -> Result<String> {
        let body = SummaryRequest { judgment, insight };
        let response: SummaryResponse = self.post_json("/v1/feedback-summary", &body).await?;
        Ok(response.summary)
    }
}

/// Evaluator context: the banded metrics, followed by any recent trends.
fn affect_context(features: &AffectFeatures, trends: Option<&str>) -> String {
    match trends {
        Some(trends) => format!("{}\n\n{}", features.describe(), trends),
        None => features.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> AffectFeatures {
        AffectFeatures {
            smile: 70,
            eye_open: 60,
            brow_raise: 20,
            mouth_open: 10,
            tension: 30,
            symmetry: 90,
            confidence: 95,
            timestamp: 0,
            frame_id: "f-1".to_string(),
        }
    }

    #[test]
    fn test_affect_context_appends_trends() {
        let f = features();
        assert_eq!(affect_context(&f, None), f.describe());

        let context = affect_context(&f, Some("RECENT TRENDS: Expression remains stable"));
        assert!(context.starts_with(&f.describe()));
        assert!(context.ends_with("\n\nRECENT TRENDS: Expression remains stable"));

        let body = serde_json::to_value(AffectRequest {
            features: &f,
            context,
        })
        .unwrap();
        assert_eq!(body["features"]["eyeOpen"], 60);
        assert!(body["context"].as_str().unwrap().contains("RECENT TRENDS"));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let service =
            HttpAnalysisService::new("http://localhost:9000/", Some(String::new()), Duration::from_secs(1)).unwrap();
        assert_eq!(service.url("/v1/transcriptions"), "http://localhost:9000/v1/transcriptions");
        assert!(service.api_key.is_none());
    }

    #[test]
    fn test_answer_request_wire_format() {
        let request = AnswerAnalysisRequest {
            question: "Why us?".to_string(),
            answer: "Because.".to_string(),
            job_role: "Engineer".to_string(),
            job_level: "Mid".to_string(),
            question_type: "Behavioral".to_string(),
            custom_instruction: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["job_role"], "Engineer");
        assert!(json.get("custom_instruction").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Port 9 (discard) is not expected to accept HTTP connections
        let service = HttpAnalysisService::new("http://127.0.0.1:9", None, Duration::from_millis(200)).unwrap();
        assert!(service.transcribe(b"audio").await.is_err());
    }
}
