//! # Conversation Orchestrator
//!
//! Drives every session through its interview. The transport hands each
//! inbound event to one of the `handle_*` methods and forwards the returned
//! outbound events to the client, in order.
//!
//! ## Two Paths Into the Barrier:
//! - **Text path**: an answer is scored by the text analyzer, the turn policy
//!   is applied, and the merge barrier is checked
//! - **Affect path**: expression features are interpreted and the barrier is
//!   checked
//!
//! Either path may complete first. Whichever one finds both results in place
//! emits the unified `feedback` event; the other emits nothing extra.
//!
//! ## Locking:
//! The session mutex is taken for each check-then-act step and released
//! before any port call. Results are re-validated against the session after
//! the call returns.

use crate::analysis::{AffectFeatures, MergeClaim, TextJudgment, UnifiedFeedbackCoordinator};
use crate::conversation::events::{OutboundEvent, SessionInit};
use crate::conversation::{messages, policy};
use crate::error::{AppError, AppResult};
use crate::ports::{AnswerAnalysisRequest, FacialAnalysisPort, QuestionSource, SummaryPort, TextAnalysisPort};
use crate::session::{
    CurrentQuestion, Phase, QuestionSequencer, QuestionSet, SessionSnapshot, SessionState, SessionStore,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error code sent when an answer could not be scored.
pub const ANALYSIS_UNAVAILABLE: &str = "analysis_unavailable";

#[derive(Debug, Default)]
struct ConversationCounters {
    sessions_started: AtomicU64,
    turns_evaluated: AtomicU64,
    unified_feedback_emitted: AtomicU64,
    analysis_failures: AtomicU64,
}

/// Counters exposed on the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub sessions_started: u64,
    pub turns_evaluated: u64,
    pub unified_feedback_emitted: u64,
    pub analysis_failures: u64,
}

pub struct ConversationOrchestrator {
    sessions: SessionStore,
    questions: Arc<dyn QuestionSource>,
    text_analyzer: Arc<dyn TextAnalysisPort>,
    affect_analyzer: Arc<dyn FacialAnalysisPort>,
    coordinator: UnifiedFeedbackCoordinator,
    counters: ConversationCounters,
}

impl ConversationOrchestrator {
    pub fn new(
        sessions: SessionStore,
        questions: Arc<dyn QuestionSource>,
        text_analyzer: Arc<dyn TextAnalysisPort>,
        affect_analyzer: Arc<dyn FacialAnalysisPort>,
        summary: Arc<dyn SummaryPort>,
    ) -> Self {
        Self {
            sessions,
            questions,
            text_analyzer,
            affect_analyzer,
            coordinator: UnifiedFeedbackCoordinator::new(summary),
            counters: ConversationCounters::default(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Create a session and greet the candidate.
    ///
    /// ## Returns:
    /// - **Ok((session_id, greeting))**: the session is live and awaiting readiness
    /// - **Err(ValidationError)**: a required field is blank
    /// - **Err(BadRequest)**: the session already exists, or no questions match
    /// - **Err(Internal)**: the question source failed
    pub async fn init_session(&self, init: SessionInit) -> AppResult<(String, OutboundEvent)> {
        let session_id = init
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.sessions.contains(&session_id) {
            return Err(AppError::BadRequest(format!(
                "Session '{}' is already initialized",
                session_id
            )));
        }

        let metadata = init.metadata();
        for (field, value) in [
            ("candidateName", &metadata.candidate_name),
            ("jobRole", &metadata.job_role),
            ("jobLevel", &metadata.job_level),
            ("questionType", &metadata.question_type),
        ] {
            if value.is_empty() {
                return Err(AppError::ValidationError(format!("{} must not be empty", field)));
            }
        }

        let questions = self.questions.fetch_questions(&metadata).await.map_err(|e| {
            error!(session_id = %session_id, "Failed to fetch questions: {:#}", e);
            AppError::Internal(format!("Question lookup failed: {:#}", e))
        })?;

        if questions.is_empty() {
            warn!(
                session_id = %session_id,
                job_role = %metadata.job_role,
                job_level = %metadata.job_level,
                question_type = %metadata.question_type,
                "No questions available"
            );
            return Err(AppError::BadRequest(format!(
                "No questions available for {} {} ({})",
                metadata.job_level, metadata.job_role, metadata.question_type
            )));
        }

        let greeting = messages::greeting(&metadata.candidate_name);
        let total = questions.len();
        self.sessions
            .insert(SessionState::new(session_id.clone(), metadata, QuestionSet::new(questions)))?;
        self.counters.sessions_started.fetch_add(1, Ordering::Relaxed);

        info!(session_id = %session_id, questions = total, "Interview session initialized");
        Ok((session_id, OutboundEvent::Greeting { content: greeting }))
    }

    /// A typed reply from the candidate, or the final transcript of a spoken
    /// one. Before readiness it is checked for confirmation; afterwards it is
    /// the answer to the open question.
    pub async fn handle_user_text(&self, session_id: &str, content: &str) -> AppResult<Vec<OutboundEvent>> {
        let session = self.sessions.require(session_id)?;

        let (question_index, request) = {
            let mut state = session.lock().await;
            let phase = state.phase;
            match phase {
                Phase::AwaitingReadiness => {
                    if !messages::is_ready_reply(content) {
                        debug!(session_id = %session_id, "Candidate is not ready yet");
                        return Ok(vec![OutboundEvent::message(messages::NOT_READY_PROMPT)]);
                    }

                    info!(session_id = %session_id, "Candidate confirmed readiness");
                    let event = policy::open_interview(&mut state);
                    let finished = state.phase.is_finished();
                    drop(state);
                    if finished {
                        self.end_session(session_id);
                    }
                    return Ok(vec![event]);
                }
                Phase::Evaluating => {
                    debug!(session_id = %session_id, "Answer received while still evaluating");
                    return Ok(vec![OutboundEvent::message(messages::STILL_REVIEWING)]);
                }
                Phase::Complete | Phase::Terminated => {
                    return Err(AppError::BadRequest("The interview has already finished".to_string()));
                }
                Phase::AwaitingAnswer => {}
            }

            let question = match QuestionSequencer::current(&state) {
                CurrentQuestion::Question { question, .. } => question.text.clone(),
                CurrentQuestion::Complete => {
                    return Err(AppError::BadRequest("There is no open question".to_string()));
                }
            };

            state.phase = Phase::Evaluating;
            let request = AnswerAnalysisRequest {
                question,
                answer: content.trim().to_string(),
                job_role: state.metadata.job_role.clone(),
                job_level: state.metadata.job_level.clone(),
                question_type: state.metadata.question_type.clone(),
                custom_instruction: state.metadata.custom_instruction.clone(),
            };
            (state.current_question_index, request)
        };

        let judgment = if request.answer.is_empty() {
            debug!(session_id = %session_id, question_index, "Empty answer, treating as a technical issue");
            TextJudgment::technical_issue()
        } else {
            match self.text_analyzer.analyze_text(&request).await {
                Ok(judgment) => judgment,
                Err(e) => {
                    error!(session_id = %session_id, question_index, "Text analysis failed: {:#}", e);
                    self.counters.analysis_failures.fetch_add(1, Ordering::Relaxed);

                    let mut state = session.lock().await;
                    if state.phase == Phase::Evaluating && state.current_question_index == question_index {
                        state.phase = Phase::AwaitingAnswer;
                    }
                    return Ok(vec![OutboundEvent::error(ANALYSIS_UNAVAILABLE, messages::ANALYSIS_APOLOGY)]);
                }
            }
        };

        let (claim, turn_event, finished) = {
            let mut state = session.lock().await;
            if state.phase != Phase::Evaluating || state.current_question_index != question_index {
                warn!(
                    session_id = %session_id,
                    question_index,
                    "Discarding text analysis for a question that is no longer open"
                );
                return Ok(Vec::new());
            }

            debug!(
                session_id = %session_id,
                question_index,
                score = judgment.score,
                action = ?judgment.next_action.kind,
                "Answer judged"
            );

            // A retried or followed-up question merges once, with its last answer
            let decision = policy::decide(&judgment, state.retry_attempts, state.follow_up_attempts);
            let claim = if decision.keeps_question() {
                debug!(session_id = %session_id, question_index, ?decision, "Question stays open, deferring merge");
                None
            } else {
                self.coordinator
                    .record_text_result(&mut state, question_index, judgment.clone());
                self.coordinator.claim(&mut state)
            };
            let turn_event = policy::conclude_turn(&mut state, &judgment);
            (claim, turn_event, state.phase.is_finished())
        };
        self.counters.turns_evaluated.fetch_add(1, Ordering::Relaxed);

        let mut events = Vec::with_capacity(2);
        if let Some(claim) = claim {
            events.push(self.emit_feedback(claim).await);
        }
        events.push(turn_event);

        if finished {
            self.end_session(session_id);
        }
        Ok(events)
    }

    /// Final transcript of a spoken answer. The transcript is echoed back
    /// before the answer is evaluated.
    pub async fn handle_transcript(&self, session_id: &str, text: &str) -> AppResult<Vec<OutboundEvent>> {
        let mut events = vec![OutboundEvent::Transcript { text: text.to_string() }];
        events.extend(self.handle_user_text(session_id, text).await?);
        Ok(events)
    }

    /// Expression features from the candidate's camera. Ignored until the
    /// candidate has confirmed readiness.
    pub async fn handle_affect_features(
        &self,
        session_id: &str,
        features: AffectFeatures,
    ) -> AppResult<Vec<OutboundEvent>> {
        let session = self.sessions.require(session_id)?;
        let trends = {
            let mut state = session.lock().await;
            if !state.ready || state.phase.is_finished() {
                debug!(session_id = %session_id, phase = state.phase.as_str(), "Ignoring affect features");
                return Ok(Vec::new());
            }

            features.validate().map_err(AppError::ValidationError)?;
            state.affect_history.push(features.clone());
            state.affect_history.trends()
        };

        let outcome = self
            .affect_analyzer
            .analyze_affect(&features, trends.as_deref())
            .await;

        let claim = {
            let mut state = session.lock().await;
            if state.phase.is_finished() {
                return Ok(Vec::new());
            }

            match outcome {
                Ok(insight) => self.coordinator.record_facial_result(&mut state, insight),
                Err(e) => {
                    warn!(session_id = %session_id, frame_id = %features.frame_id, "Affect analysis failed: {:#}", e);
                    self.counters.analysis_failures.fetch_add(1, Ordering::Relaxed);
                    self.coordinator.mark_facial_failed(&mut state);
                }
            }
            self.coordinator.claim(&mut state)
        };

        match claim {
            Some(claim) => Ok(vec![self.emit_feedback(claim).await]),
            None => Ok(Vec::new()),
        }
    }

    /// Evict a session. Returns true when it was still live.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id);
        if removed {
            info!(session_id = %session_id, "Interview session ended");
        }
        removed
    }

    pub async fn snapshot(&self, session_id: &str) -> AppResult<SessionSnapshot> {
        let session = self.sessions.require(session_id)?;
        let state = session.lock().await;
        Ok(state.snapshot())
    }

    pub fn stats(&self) -> ConversationStats {
        ConversationStats {
            active_sessions: self.sessions.count(),
            max_sessions: self.sessions.max_sessions(),
            sessions_started: self.counters.sessions_started.load(Ordering::Relaxed),
            turns_evaluated: self.counters.turns_evaluated.load(Ordering::Relaxed),
            unified_feedback_emitted: self.counters.unified_feedback_emitted.load(Ordering::Relaxed),
            analysis_failures: self.counters.analysis_failures.load(Ordering::Relaxed),
        }
    }

    async fn emit_feedback(&self, claim: MergeClaim) -> OutboundEvent {
        let content = self.coordinator.resolve(claim).await;
        self.counters.unified_feedback_emitted.fetch_add(1, Ordering::Relaxed);
        OutboundEvent::Feedback { content }
    }
}
