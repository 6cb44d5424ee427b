//! # Unified Feedback Coordinator
//!
//! The barrier between the two independent evaluations of an answer. Text
//! and affect results arrive in either order, each on its own task. Once
//! both are in, exactly one of those tasks claims the pair and produces the
//! merged feedback.
//!
//! ## How the once-only guarantee holds:
//! 1. Results are recorded while the caller holds the session mutex
//! 2. `claim` runs under that same mutex, and takes the pending record out of
//!    the session when it is ready
//! 3. The summary call happens after the lock is released, on the claimed data
//!
//! A second caller sees no pending record and gets `None`.

use crate::analysis::affect::AffectInsight;
use crate::analysis::feedback::local_fallback_summary;
use crate::analysis::judgment::TextJudgment;
use crate::ports::SummaryPort;
use crate::session::{AnalysisStatus, PendingAnalyses, SessionState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluations taken out of a session, ready to be merged.
#[derive(Debug, Clone)]
pub enum MergeClaim {
    /// Both evaluations succeeded
    Unified {
        session_id: String,
        question_index: usize,
        judgment: TextJudgment,
        insight: AffectInsight,
    },
    /// Text succeeded but affect analysis failed
    Fallback {
        session_id: String,
        question_index: usize,
        judgment: TextJudgment,
    },
}

impl MergeClaim {
    pub fn question_index(&self) -> usize {
        match self {
            MergeClaim::Unified { question_index, .. } | MergeClaim::Fallback { question_index, .. } => {
                *question_index
            }
        }
    }
}

pub struct UnifiedFeedbackCoordinator {
    summary: Arc<dyn SummaryPort>,
}

impl UnifiedFeedbackCoordinator {
    pub fn new(summary: Arc<dyn SummaryPort>) -> Self {
        Self { summary }
    }

    /// Store the text evaluation for `question_index`.
    ///
    /// An open record belonging to another question is stale and gets
    /// replaced.
    pub fn record_text_result(&self, state: &mut SessionState, question_index: usize, judgment: TextJudgment) {
        let stale = state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.question_index != question_index);
        if stale {
            warn!(
                session_id = %state.session_id,
                question_index,
                "Discarding stale pending analyses from an earlier question"
            );
            state.pending = None;
        }

        let pending = state
            .pending
            .get_or_insert_with(|| PendingAnalyses::new(question_index));
        pending.text_result = Some(judgment);
        pending.text_status = AnalysisStatus::Completed;
    }

    /// Store an affect insight. It joins whichever record is open, or opens
    /// one for the current question.
    pub fn record_facial_result(&self, state: &mut SessionState, insight: AffectInsight) {
        let question_index = state.current_question_index;
        let pending = state
            .pending
            .get_or_insert_with(|| PendingAnalyses::new(question_index));
        pending.facial_result = Some(insight);
        pending.facial_status = AnalysisStatus::Completed;
    }

    pub fn mark_facial_failed(&self, state: &mut SessionState) {
        let question_index = state.current_question_index;
        let pending = state
            .pending
            .get_or_insert_with(|| PendingAnalyses::new(question_index));
        pending.facial_result = None;
        pending.facial_status = AnalysisStatus::Failed;
    }

    /// Take the pending evaluations out of the session if they are ready to
    /// merge. Must be called with the session mutex held.
    pub fn claim(&self, state: &mut SessionState) -> Option<MergeClaim> {
        let Some(pending) = state.pending.as_ref() else {
            debug!(session_id = %state.session_id, "No pending analyses to merge");
            return None;
        };

        if !pending.waiting_for_merge {
            debug!(session_id = %state.session_id, "Pending analyses already merged");
            return None;
        }

        let facial_failed = pending.has_text() && pending.facial_status == AnalysisStatus::Failed;
        if !pending.is_complete() && !facial_failed {
            debug!(
                session_id = %state.session_id,
                question_index = pending.question_index,
                outstanding = pending.outstanding(),
                "Waiting for remaining analysis before merging"
            );
            return None;
        }

        let mut pending = state.pending.take()?;
        pending.waiting_for_merge = false;
        let judgment = pending.text_result.take()?;
        let session_id = state.session_id.clone();

        let claim = match pending.facial_result.take() {
            Some(insight) => MergeClaim::Unified {
                session_id,
                question_index: pending.question_index,
                judgment,
                insight,
            },
            None => MergeClaim::Fallback {
                session_id,
                question_index: pending.question_index,
                judgment,
            },
        };

        info!(
            session_id = %state.session_id,
            question_index = claim.question_index(),
            "Analyses claimed for unified feedback"
        );
        Some(claim)
    }

    /// Produce merged feedback text for a claim. Never fails: summary errors
    /// fall back to a locally built message.
    pub async fn resolve(&self, claim: MergeClaim) -> String {
        match claim {
            MergeClaim::Unified {
                session_id,
                judgment,
                insight,
                ..
            } => match self.summary.summarize(&judgment, &insight).await {
                Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
                Ok(_) => {
                    warn!(session_id = %session_id, "Summary service returned empty text, using fallback");
                    local_fallback_summary(&judgment)
                }
                Err(e) => {
                    warn!(session_id = %session_id, "Summary creation failed, using fallback: {:#}", e);
                    local_fallback_summary(&judgment)
                }
            },
            MergeClaim::Fallback { session_id, judgment, .. } => {
                debug!(session_id = %session_id, "Affect analysis failed, merging text feedback only");
                local_fallback_summary(&judgment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::judgment::NextAction;
    use crate::session::{Question, QuestionSet, SessionMetadata, SharedSession};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct CountingSummary {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSummary {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl SummaryPort for CountingSummary {
        async fn summarize(&self, judgment: &TextJudgment, insight: &AffectInsight) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(anyhow!("summary backend unavailable"));
            }
            Ok(format!("{} / {}", judgment.score, insight.feedback))
        }
    }

    fn session() -> SessionState {
        let metadata = SessionMetadata {
            candidate_name: "Ada".to_string(),
            job_role: "Engineer".to_string(),
            job_level: "Mid".to_string(),
            question_type: "Behavioral".to_string(),
            custom_instruction: None,
        };
        let questions = QuestionSet::new(vec![Question::new("q1", "One?"), Question::new("q2", "Two?")]);
        SessionState::new("s1".to_string(), metadata, questions)
    }

    fn judgment(score: u8) -> TextJudgment {
        TextJudgment {
            score,
            feedback: "Solid.".to_string(),
            strengths: vec!["clarity".to_string()],
            tips: vec!["add numbers".to_string()],
            technical_issue_detected: false,
            needs_retry: false,
            next_action: NextAction::default(),
        }
    }

    #[test]
    fn test_facial_first_waits_for_text() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(false));
        let mut state = session();

        coordinator.record_facial_result(&mut state, AffectInsight::new("Relaxed posture."));
        assert!(coordinator.claim(&mut state).is_none());
        assert!(state.pending.is_some());

        coordinator.record_text_result(&mut state, 0, judgment(8));
        let claim = coordinator.claim(&mut state).expect("barrier should fire");
        assert!(matches!(claim, MergeClaim::Unified { question_index: 0, .. }));
        assert!(state.pending.is_none());

        // Nothing left to claim
        assert!(coordinator.claim(&mut state).is_none());
    }

    #[test]
    fn test_text_first_waits_for_facial() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(false));
        let mut state = session();

        coordinator.record_text_result(&mut state, 0, judgment(6));
        assert!(coordinator.claim(&mut state).is_none());

        coordinator.record_facial_result(&mut state, AffectInsight::new("Steady eye contact."));
        assert!(coordinator.claim(&mut state).is_some());
        assert!(coordinator.claim(&mut state).is_none());
    }

    #[test]
    fn test_second_result_overwrites_first() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(false));
        let mut state = session();

        coordinator.record_facial_result(&mut state, AffectInsight::new("first"));
        coordinator.record_facial_result(&mut state, AffectInsight::new("second"));
        coordinator.record_text_result(&mut state, 0, judgment(5));

        match coordinator.claim(&mut state) {
            Some(MergeClaim::Unified { insight, .. }) => assert_eq!(insight.feedback, "second"),
            other => panic!("unexpected claim: {:?}", other),
        }
    }

    #[test]
    fn test_stale_record_is_replaced() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(false));
        let mut state = session();

        coordinator.record_text_result(&mut state, 0, judgment(3));
        state.current_question_index = 1;
        coordinator.record_text_result(&mut state, 1, judgment(9));

        let pending = state.pending.as_ref().unwrap();
        assert_eq!(pending.question_index, 1);
        assert_eq!(pending.text_result.as_ref().unwrap().score, 9);
    }

    #[test]
    fn test_facial_failure_yields_fallback_claim() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(false));
        let mut state = session();

        coordinator.mark_facial_failed(&mut state);
        assert!(coordinator.claim(&mut state).is_none());

        coordinator.record_text_result(&mut state, 0, judgment(7));
        assert!(matches!(
            coordinator.claim(&mut state),
            Some(MergeClaim::Fallback { question_index: 0, .. })
        ));
        assert!(state.pending.is_none());
    }

    #[tokio::test]
    async fn test_resolve_uses_summary() {
        let summary = CountingSummary::new(false);
        let coordinator = UnifiedFeedbackCoordinator::new(summary.clone());
        let mut state = session();
        coordinator.record_text_result(&mut state, 0, judgment(8));
        coordinator.record_facial_result(&mut state, AffectInsight::new("Calm."));

        let claim = coordinator.claim(&mut state).unwrap();
        assert_eq!(coordinator.resolve(claim).await, "8 / Calm.");
        assert_eq!(summary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_when_summary_fails() {
        let coordinator = UnifiedFeedbackCoordinator::new(CountingSummary::new(true));
        let mut state = session();
        coordinator.record_text_result(&mut state, 0, judgment(7));
        coordinator.record_facial_result(&mut state, AffectInsight::new("Calm."));

        let claim = coordinator.claim(&mut state).unwrap();
        let text = coordinator.resolve(claim).await;
        assert!(text.starts_with("Great! You scored a 7!"));
        assert!(text.contains("Your clarity really came through."));
    }

    #[tokio::test]
    async fn test_concurrent_merges_fire_once() {
        for facial_first in [true, false] {
            let summary = CountingSummary::new(false);
            let coordinator = Arc::new(UnifiedFeedbackCoordinator::new(summary.clone()));
            let shared: SharedSession = Arc::new(Mutex::new(session()));

            let text_side = {
                let coordinator = coordinator.clone();
                let shared = shared.clone();
                async move {
                    if facial_first {
                        tokio::task::yield_now().await;
                    }
                    let claim = {
                        let mut state = shared.lock().await;
                        coordinator.record_text_result(&mut state, 0, judgment(8));
                        coordinator.claim(&mut state)
                    };
                    match claim {
                        Some(claim) => Some(coordinator.resolve(claim).await),
                        None => None,
                    }
                }
            };
            let facial_side = {
                let coordinator = coordinator.clone();
                let shared = shared.clone();
                async move {
                    if !facial_first {
                        tokio::task::yield_now().await;
                    }
                    let claim = {
                        let mut state = shared.lock().await;
                        coordinator.record_facial_result(&mut state, AffectInsight::new("Calm."));
                        coordinator.claim(&mut state)
                    };
                    match claim {
                        Some(claim) => Some(coordinator.resolve(claim).await),
                        None => None,
                    }
                }
            };

            let (a, b) = tokio::join!(text_side, facial_side);
            let merged: Vec<_> = [a, b].into_iter().flatten().collect();
            assert_eq!(merged.len(), 1, "exactly one merge (facial_first = {})", facial_first);
            assert_eq!(summary.calls.load(Ordering::SeqCst), 1);
        }
    }
}
