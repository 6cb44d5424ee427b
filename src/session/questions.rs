//! Question records and the cursor that walks a session through them.

use crate::session::state::SessionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Ordered questions fetched once at session start. Never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}

/// Result of looking up a session's current position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurrentQuestion<'a> {
    /// An open question, with its 1-based number for display
    Question { number: usize, question: &'a Question },
    /// Every question has been asked
    Complete,
}

/// Cursor arithmetic over `SessionState::current_question_index`.
///
/// `advance` is the only place the index moves, which keeps the attempt
/// counters tied to it: they reset exactly when the index changes.
pub struct QuestionSequencer;

impl QuestionSequencer {
    pub fn current(state: &SessionState) -> CurrentQuestion<'_> {
        match state.questions.get(state.current_question_index) {
            Some(question) => CurrentQuestion::Question {
                number: state.current_question_index + 1,
                question,
            },
            None => CurrentQuestion::Complete,
        }
    }

    /// Move to the next question. Returns false (and changes nothing) when
    /// the interview is already complete.
    pub fn advance(state: &mut SessionState) -> bool {
        if state.current_question_index >= state.questions.len() {
            return false;
        }

        state.current_question_index += 1;
        state.retry_attempts = 0;
        state.follow_up_attempts = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::SessionMetadata;

    fn session_with(count: usize) -> SessionState {
        let questions = (0..count)
            .map(|i| Question::new(format!("q{}", i + 1), format!("Question {}?", i + 1)))
            .collect();
        let metadata = SessionMetadata {
            candidate_name: "Ada".to_string(),
            job_role: "Engineer".to_string(),
            job_level: "Mid".to_string(),
            question_type: "Technical".to_string(),
            custom_instruction: None,
        };
        SessionState::new("s1".to_string(), metadata, QuestionSet::new(questions))
    }

    #[test]
    fn test_current_returns_first_question() {
        let state = session_with(2);
        match QuestionSequencer::current(&state) {
            CurrentQuestion::Question { number, question } => {
                assert_eq!(number, 1);
                assert_eq!(question.id, "q1");
            }
            CurrentQuestion::Complete => panic!("expected a question"),
        }
    }

    #[test]
    fn test_advance_resets_attempt_counters() {
        let mut state = session_with(2);
        state.retry_attempts = 1;
        state.follow_up_attempts = 1;

        assert!(QuestionSequencer::advance(&mut state));
        assert_eq!(state.current_question_index, 1);
        assert_eq!(state.retry_attempts, 0);
        assert_eq!(state.follow_up_attempts, 0);
    }

    #[test]
    fn test_advance_past_end_is_idempotent() {
        let mut state = session_with(1);
        assert!(QuestionSequencer::advance(&mut state));
        assert_eq!(QuestionSequencer::current(&state), CurrentQuestion::Complete);

        state.retry_attempts = 1;
        for _ in 0..3 {
            assert!(!QuestionSequencer::advance(&mut state));
            assert_eq!(state.current_question_index, 1);
            assert_eq!(QuestionSequencer::current(&state), CurrentQuestion::Complete);
        }
        // Index did not change, so the counter is untouched
        assert_eq!(state.retry_attempts, 1);
    }

    #[test]
    fn test_empty_set_is_complete_immediately() {
        let state = session_with(0);
        assert_eq!(QuestionSequencer::current(&state), CurrentQuestion::Complete);
    }
}
