//! # Session State
//!
//! The authoritative record for one interview session. Only the conversation
//! orchestrator mutates it, and only while holding the session's mutex.
//!
//! ## Lifecycle:
//! 1. **AwaitingReadiness**: greeting sent, waiting for the candidate to confirm
//! 2. **AwaitingAnswer**: a question is open
//! 3. **Evaluating**: an answer is being scored
//! 4. **Complete**: every question has been answered
//! 5. **Terminated**: the evaluator suggested ending early

use crate::analysis::{AffectHistory, AffectInsight, TextJudgment};
use crate::session::questions::QuestionSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interview context supplied by the client at `session_init`.
/// Immutable once the session exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub candidate_name: String,
    pub job_role: String,
    pub job_level: String,
    pub question_type: String,
    pub custom_instruction: Option<String>,
}

/// Where a session is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingReadiness,
    AwaitingAnswer,
    Evaluating,
    Complete,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::AwaitingReadiness => "awaiting_readiness",
            Phase::AwaitingAnswer => "awaiting_answer",
            Phase::Evaluating => "evaluating",
            Phase::Complete => "complete",
            Phase::Terminated => "terminated",
        }
    }

    /// No further answers are accepted once a session has finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Terminated)
    }
}

/// Progress of one of the two independent evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

/// Coordination record for the evaluations of a single question.
///
/// Created lazily by whichever result arrives first and cleared when the
/// merged feedback is claimed. A session holds at most one.
#[derive(Debug, Clone)]
pub struct PendingAnalyses {
    /// Question the record was opened for
    pub question_index: usize,
    pub text_result: Option<TextJudgment>,
    pub text_status: AnalysisStatus,
    pub facial_result: Option<AffectInsight>,
    pub facial_status: AnalysisStatus,
    pub waiting_for_merge: bool,
}

impl PendingAnalyses {
    pub fn new(question_index: usize) -> Self {
        Self {
            question_index,
            text_result: None,
            text_status: AnalysisStatus::Pending,
            facial_result: None,
            facial_status: AnalysisStatus::Pending,
            waiting_for_merge: true,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text_status == AnalysisStatus::Completed && self.text_result.is_some()
    }

    pub fn has_facial(&self) -> bool {
        self.facial_status == AnalysisStatus::Completed && self.facial_result.is_some()
    }

    /// Both evaluations finished successfully and their results are present.
    pub fn is_complete(&self) -> bool {
        self.has_text() && self.has_facial()
    }

    /// Human-readable description of what the barrier is still waiting on.
    pub fn outstanding(&self) -> &'static str {
        match (self.has_text(), self.has_facial()) {
            (false, false) => "text and facial",
            (false, true) => "text",
            (true, false) => "facial",
            (true, true) => "nothing",
        }
    }
}

/// The per-session record.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub metadata: SessionMetadata,

    /// Flips to true exactly once, on the first affirmative reply
    pub ready: bool,
    pub phase: Phase,

    /// Owned copy of the questions fetched at init
    pub questions: QuestionSet,

    /// Position in `questions`; equal to its length once the interview is done
    pub current_question_index: usize,

    /// Both counters are reset by `QuestionSequencer::advance` only
    pub retry_attempts: u32,
    pub follow_up_attempts: u32,

    pub pending: Option<PendingAnalyses>,

    /// Recent camera frames, for trend context
    pub affect_history: AffectHistory,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: String, metadata: SessionMetadata, questions: QuestionSet) -> Self {
        Self {
            session_id,
            metadata,
            ready: false,
            phase: Phase::AwaitingReadiness,
            questions,
            current_question_index: 0,
            retry_attempts: 0,
            follow_up_attempts: 0,
            pending: None,
            affect_history: AffectHistory::default(),
            created_at: Utc::now(),
        }
    }

    pub fn waiting_for_answer(&self) -> bool {
        self.phase == Phase::AwaitingAnswer
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            candidate_name: self.metadata.candidate_name.clone(),
            job_role: self.metadata.job_role.clone(),
            phase: self.phase,
            ready: self.ready,
            waiting_for_answer: self.waiting_for_answer(),
            current_question_index: self.current_question_index,
            total_questions: self.questions.len(),
            retry_attempts: self.retry_attempts,
            follow_up_attempts: self.follow_up_attempts,
            pending: self.pending.as_ref().map(|p| PendingSnapshot {
                question_index: p.question_index,
                text_status: p.text_status,
                facial_status: p.facial_status,
                waiting_for_merge: p.waiting_for_merge,
            }),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// Read-only view of a session returned by the sessions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub candidate_name: String,
    pub job_role: String,
    pub phase: Phase,
    pub ready: bool,
    pub waiting_for_answer: bool,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub retry_attempts: u32,
    pub follow_up_attempts: u32,
    pub pending: Option<PendingSnapshot>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSnapshot {
    pub question_index: usize,
    pub text_status: AnalysisStatus,
    pub facial_status: AnalysisStatus,
    pub waiting_for_merge: bool,
}
