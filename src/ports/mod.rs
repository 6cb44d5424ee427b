//! # External Collaborators
//!
//! Every speech, scoring, and question service the conversation engine
//! talks to sits behind one of these traits. The engine never sees HTTP or
//! any other transport. It sees only these ports, injected at construction.
//!
//! ## Adapters:
//! - **http**: JSON-over-HTTP client for the analysis service
//! - **affect**: local rule-based affect analyzer
//! - **questions**: TOML-backed question bank
//!
//! All port methods are async and return `anyhow::Result`; callers decide
//! which failures become fallbacks and which surface to the client.

pub mod affect; // Local rule-based affect analysis
pub mod http; // HTTP analysis service client
pub mod questions; // TOML question bank

use crate::analysis::{AffectFeatures, AffectInsight, TextJudgment};
use crate::session::{Question, SessionMetadata};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use affect::RuleBasedAffectAnalyzer;
pub use http::HttpAnalysisService;
pub use questions::QuestionBank;

/// Everything the text evaluator needs to score one answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerAnalysisRequest {
    pub question: String,
    pub answer: String,
    pub job_role: String,
    pub job_level: String,
    pub question_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instruction: Option<String>,
}

/// Raw audio bytes to text. May return an empty string.
#[async_trait]
pub trait TranscriptionPort: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Scores an answer and suggests the next conversational move.
#[async_trait]
pub trait TextAnalysisPort: Send + Sync {
    async fn analyze_text(&self, request: &AnswerAnalysisRequest) -> Result<TextJudgment>;
}

/// Derives a short behavioral insight from expression features. `trends`
/// describes how the session's recent frames changed, when known.
#[async_trait]
pub trait FacialAnalysisPort: Send + Sync {
    async fn analyze_affect(&self, features: &AffectFeatures, trends: Option<&str>) -> Result<AffectInsight>;
}

/// Merges the two evaluations into one piece of feedback.
#[async_trait]
pub trait SummaryPort: Send + Sync {
    async fn summarize(&self, judgment: &TextJudgment, insight: &AffectInsight) -> Result<String>;
}

/// Ordered questions for a role, level, and category.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_questions(&self, metadata: &SessionMetadata) -> Result<Vec<Question>>;
}
