//! # Turn Policy
//!
//! Decides what happens after an answer has been judged, and applies that
//! decision to the session.
//!
//! ## Priority:
//! 1. **Retry**: a technical issue or retry request repeats the question once
//! 2. **Follow-up**: the evaluator wants more detail, asked once per question
//! 3. **Exit**: the evaluator suggests ending the interview early
//! 4. **Continue**: move to the next question, or finish
//!
//! Every outcome opens with the formatted text feedback for the answer.

use crate::analysis::feedback::join_parts;
use crate::analysis::{format_feedback, ActionKind, TextJudgment};
use crate::conversation::events::OutboundEvent;
use crate::conversation::messages;
use crate::session::{CurrentQuestion, Phase, QuestionSequencer, SessionState};

/// Extra attempts allowed per question before moving on.
pub const RETRY_BUDGET: u32 = 1;
pub const FOLLOW_UP_BUDGET: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
    Retry,
    RetryExhausted,
    FollowUp,
    FollowUpExhausted,
    Exit,
    Continue,
}

impl TurnDecision {
    /// The same question stays open for another attempt.
    pub fn keeps_question(self) -> bool {
        matches!(self, TurnDecision::Retry | TurnDecision::FollowUp)
    }
}

pub fn decide(judgment: &TextJudgment, retry_attempts: u32, follow_up_attempts: u32) -> TurnDecision {
    if judgment.wants_retry() {
        return if retry_attempts < RETRY_BUDGET {
            TurnDecision::Retry
        } else {
            TurnDecision::RetryExhausted
        };
    }

    match judgment.next_action.kind {
        ActionKind::AskFollowUp if follow_up_attempts < FOLLOW_UP_BUDGET => TurnDecision::FollowUp,
        ActionKind::AskFollowUp => TurnDecision::FollowUpExhausted,
        ActionKind::SuggestExit => TurnDecision::Exit,
        ActionKind::Continue | ActionKind::RetryQuestion => TurnDecision::Continue,
    }
}

/// Apply the policy to a session whose answer has just been judged and
/// return the event that carries the feedback and the next prompt.
pub fn conclude_turn(state: &mut SessionState, judgment: &TextJudgment) -> OutboundEvent {
    let feedback = format_feedback(judgment);
    let action_message = judgment.next_action.message.as_str();

    match decide(judgment, state.retry_attempts, state.follow_up_attempts) {
        TurnDecision::Retry => {
            state.retry_attempts += 1;
            state.phase = Phase::AwaitingAnswer;
            OutboundEvent::message(join_parts([feedback.as_str(), action_message]))
        }
        TurnDecision::RetryExhausted => {
            let preface = join_parts([feedback.as_str(), messages::TECHNICAL_DIFFICULTY_MOVE_ON]);
            move_on(state, &preface, messages::moved_on_question)
        }
        TurnDecision::FollowUp => {
            state.follow_up_attempts += 1;
            state.phase = Phase::AwaitingAnswer;
            let original_question = judgment
                .next_action
                .follow_up_details
                .as_ref()
                .map(|details| details.original_question.as_str())
                .unwrap_or_default();
            OutboundEvent::message(join_parts([feedback.as_str(), action_message, original_question]))
        }
        TurnDecision::FollowUpExhausted => {
            let preface = join_parts([feedback.as_str(), messages::FOLLOW_UP_MOVE_ON]);
            move_on(state, &preface, messages::moved_on_question)
        }
        TurnDecision::Exit => {
            state.phase = Phase::Terminated;
            OutboundEvent::SessionEnd {
                content: join_parts([feedback.as_str(), action_message]),
            }
        }
        TurnDecision::Continue => {
            let preface = join_parts([feedback.as_str(), action_message]);
            move_on(state, &preface, messages::next_question)
        }
    }
}

/// Ask the first question once the candidate has confirmed readiness.
pub fn open_interview(state: &mut SessionState) -> OutboundEvent {
    state.ready = true;
    let (event, phase) = match QuestionSequencer::current(state) {
        CurrentQuestion::Question { number, question } => (
            OutboundEvent::NextQuestion {
                content: messages::first_question(&question.text),
                question_number: number,
                total_questions: state.questions.len(),
            },
            Phase::AwaitingAnswer,
        ),
        CurrentQuestion::Complete => (
            OutboundEvent::InterviewComplete {
                content: messages::INTERVIEW_COMPLETE.to_string(),
            },
            Phase::Complete,
        ),
    };
    state.phase = phase;
    event
}

fn move_on(state: &mut SessionState, preface: &str, prompt: fn(&str) -> String) -> OutboundEvent {
    QuestionSequencer::advance(state);

    let (event, phase) = match QuestionSequencer::current(state) {
        CurrentQuestion::Question { number, question } => (
            OutboundEvent::NextQuestion {
                content: join_parts([preface, prompt(&question.text).as_str()]),
                question_number: number,
                total_questions: state.questions.len(),
            },
            Phase::AwaitingAnswer,
        ),
        CurrentQuestion::Complete => (
            OutboundEvent::InterviewComplete {
                content: join_parts([preface, messages::INTERVIEW_COMPLETE]),
            },
            Phase::Complete,
        ),
    };
    state.phase = phase;
    event
}
