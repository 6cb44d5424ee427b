//! Wire format of the interview WebSocket. Every frame is a JSON object
//! tagged by `type`; field names are camelCase.

use crate::analysis::AffectFeatures;
use crate::error::{AppError, AppResult};
use crate::session::SessionMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInit {
    /// Generated when absent or blank
    #[serde(default)]
    pub session_id: Option<String>,
    pub candidate_name: String,
    pub job_role: String,
    pub job_level: String,
    pub question_type: String,
    #[serde(default)]
    pub custom_instruction: Option<String>,
}

impl SessionInit {
    /// Interview context with surrounding whitespace removed. A blank custom
    /// instruction counts as none.
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            candidate_name: self.candidate_name.trim().to_string(),
            job_role: self.job_role.trim().to_string(),
            job_level: self.job_level.trim().to_string(),
            question_type: self.question_type.trim().to_string(),
            custom_instruction: self
                .custom_instruction
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

fn default_speaking() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFragment {
    /// Base64-encoded audio bytes
    pub data: String,
    #[serde(default = "default_speaking")]
    pub is_speaking: bool,
}

/// Client-to-server events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    SessionInit(SessionInit),
    UserText {
        content: String,
    },
    AudioFragment(AudioFragment),
    AudioEnd {},
    AffectFeatures(AffectFeatures),
    Ping {
        #[serde(default)]
        timestamp: Option<Value>,
    },
}

impl InboundEvent {
    /// Malformed frames are client errors.
    pub fn parse(text: &str) -> AppResult<Self> {
        serde_json::from_str(text).map_err(|e| AppError::BadRequest(format!("Invalid message: {}", e)))
    }
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Greeting {
        content: String,
    },
    Message {
        content: String,
    },
    /// Unified feedback merged from both evaluations
    Feedback {
        content: String,
    },
    IncrementalTranscript {
        text: String,
    },
    Transcript {
        text: String,
    },
    NextQuestion {
        content: String,
        #[serde(rename = "questionNumber")]
        question_number: usize,
        #[serde(rename = "totalQuestions")]
        total_questions: usize,
    },
    InterviewComplete {
        content: String,
    },
    /// The connection is closed once this has been delivered
    SessionEnd {
        content: String,
    },
    Error {
        code: String,
        message: String,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<Value>,
    },
}

impl OutboundEvent {
    pub fn message(content: impl Into<String>) -> Self {
        OutboundEvent::Message { content: content.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Client-safe rendering of an application error.
    pub fn from_error(err: &AppError) -> Self {
        Self::error(err.code(), err.client_message())
    }

    pub fn is_session_end(&self) -> bool {
        matches!(self, OutboundEvent::SessionEnd { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Greeting { .. } => "greeting",
            OutboundEvent::Message { .. } => "message",
            OutboundEvent::Feedback { .. } => "feedback",
            OutboundEvent::IncrementalTranscript { .. } => "incremental_transcript",
            OutboundEvent::Transcript { .. } => "transcript",
            OutboundEvent::NextQuestion { .. } => "next_question",
            OutboundEvent::InterviewComplete { .. } => "interview_complete",
            OutboundEvent::SessionEnd { .. } => "session_end",
            OutboundEvent::Error { .. } => "error",
            OutboundEvent::Pong { .. } => "pong",
        }
    }
}
