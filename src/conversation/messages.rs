//! Candidate-facing prompt texts.

/// Replies that count as confirming readiness. Matched as lowercase
/// substrings of the reply.
pub const READINESS_KEYWORDS: [&str; 5] = ["yes", "ready", "i'm ready", "let's start", "let's go"];

pub const NOT_READY_PROMPT: &str = "Let me know when you're ready to begin!";

pub const INTERVIEW_COMPLETE: &str = "That's the end of the interview. Great job!";

pub const TECHNICAL_DIFFICULTY_MOVE_ON: &str = "Due to technical difficulties, let's move on to the next question.";

pub const FOLLOW_UP_MOVE_ON: &str = "Let's move on to the next question.";

pub const STILL_REVIEWING: &str =
    "I'm still reviewing your previous answer. I'll share my feedback in just a moment.";

pub const ANALYSIS_APOLOGY: &str =
    "Sorry, I had trouble reviewing that answer. Could you please share it again?";

const ANSWER_REMINDER: &str = "Take your time, and remember to be specific about your role and the impact you made.";

const LOOKING_FORWARD: &str = "I'm looking forward to hearing your response!";

pub fn is_ready_reply(reply: &str) -> bool {
    let reply = reply.to_lowercase();
    READINESS_KEYWORDS.iter().any(|keyword| reply.contains(keyword))
}

pub fn greeting(candidate_name: &str) -> String {
    format!(
        "Hi {}, thanks for being here today! We're going to walk through a series of questions \
         designed to help you shine and feel confident in your responses. This mock interview will \
         give you a chance to practice articulating your experiences clearly and concisely. I'll provide \
         feedback after each of your answers to help you refine your approach. Are you ready for \
         your interview?",
        candidate_name
    )
}

pub fn first_question(question: &str) -> String {
    format!(
        "Great! I'm excited to see how you do. Here's your first question: {} {} {}",
        question, ANSWER_REMINDER, LOOKING_FORWARD
    )
}

pub fn next_question(question: &str) -> String {
    format!("Here's your next question: {} {} {}", question, ANSWER_REMINDER, LOOKING_FORWARD)
}

/// Shorter prompt used after moving on from a question that could not be
/// completed.
pub fn moved_on_question(question: &str) -> String {
    format!("{} {}", question, ANSWER_REMINDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_is_case_insensitive_substring() {
        assert!(is_ready_reply("Yes"));
        assert!(is_ready_reply("I think I'm READY now"));
        assert!(is_ready_reply("ok, let's go"));
        assert!(!is_ready_reply("not yet"));
        assert!(!is_ready_reply(""));
    }

    #[test]
    fn test_prompts_embed_question() {
        let q = "Why this role?";
        assert!(first_question(q).starts_with("Great! I'm excited to see how you do. Here's your first question: Why this role?"));
        assert!(next_question(q).starts_with("Here's your next question: Why this role?"));
        assert!(next_question(q).ends_with(LOOKING_FORWARD));
        assert!(!moved_on_question(q).contains(LOOKING_FORWARD));
        assert!(greeting("Ada").starts_with("Hi Ada, thanks for being here today!"));
    }
}
