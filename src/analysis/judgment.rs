//! # Text Judgments
//!
//! The scored evaluation of one answer, plus the lenient parser that turns
//! loosely formatted evaluator output into one.
//!
//! Evaluator output is not always clean JSON. It can carry reasoning wrapped
//! in `<think>` tags, prose before the object, or `next_action` fields at the
//! root. `parse_text_judgment` accepts all of these and normalizes the result:
//! the score is clamped to 0-10 and unknown action types become `continue`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message used when the evaluator output carries no usable next action.
pub const ANALYSIS_RETRY_MESSAGE: &str =
    "There was a technical error analyzing your response. Please try answering the question again.";

/// Message used when the candidate's answer arrived empty.
pub const EMPTY_ANSWER_MESSAGE: &str =
    "I didn't catch your answer. Could you try answering the question again?";

/// What the evaluator suggests doing after this answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    Continue,
    RetryQuestion,
    AskFollowUp,
    SuggestExit,
}

impl ActionKind {
    /// Unknown or missing action types fall back to `Continue`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "retry_question" => ActionKind::RetryQuestion,
            "ask_follow_up" | "follow_up" => ActionKind::AskFollowUp,
            "suggest_exit" => ActionKind::SuggestExit,
            _ => ActionKind::Continue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpDetails {
    pub original_question: String,
    #[serde(default)]
    pub identified_gap: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_details: Option<FollowUpDetails>,
}

/// Scored evaluation of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextJudgment {
    /// 0 to 10 inclusive
    pub score: u8,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub technical_issue_detected: bool,
    #[serde(default)]
    pub needs_retry: bool,
    #[serde(default)]
    pub next_action: NextAction,
}

impl TextJudgment {
    /// Judgment for an answer that never made it through transcription.
    pub fn technical_issue() -> Self {
        Self {
            score: 0,
            feedback: String::new(),
            strengths: Vec::new(),
            tips: Vec::new(),
            technical_issue_detected: true,
            needs_retry: true,
            next_action: NextAction {
                kind: ActionKind::RetryQuestion,
                message: EMPTY_ANSWER_MESSAGE.to_string(),
                follow_up_details: None,
            },
        }
    }

    /// A `retry_question` action counts the same as the retry flags.
    pub fn wants_retry(&self) -> bool {
        self.technical_issue_detected
            || self.needs_retry
            || self.next_action.kind == ActionKind::RetryQuestion
    }
}

/// Parse evaluator output into a `TextJudgment`.
///
/// Tries strict JSON first, then the first balanced `{...}` object found
/// after any `<think>` block.
pub fn parse_text_judgment(raw: &str) -> Result<TextJudgment> {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(_) => {
            let object = extract_json_object(raw)
                .ok_or_else(|| anyhow!("no JSON object found in analysis output"))?;
            serde_json::from_str(object).context("analysis output is not valid JSON")?
        }
    };

    judgment_from_value(&value)
}

/// Build a judgment from an already decoded JSON value.
pub fn judgment_from_value(value: &Value) -> Result<TextJudgment> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("analysis output is not a JSON object"))?;

    let next_action = match object.get("next_action") {
        Some(Value::Object(action)) => next_action_from(action),
        // Some evaluators flatten the action onto the root object
        _ if object.contains_key("type") && object.contains_key("message") => {
            next_action_from(object)
        }
        _ => NextAction {
            kind: ActionKind::RetryQuestion,
            message: ANALYSIS_RETRY_MESSAGE.to_string(),
            follow_up_details: None,
        },
    };

    Ok(TextJudgment {
        score: object.get("score").map(score_from).unwrap_or(0),
        feedback: string_field(object, "feedback"),
        strengths: string_list(object.get("strengths")),
        tips: string_list(object.get("tips")),
        technical_issue_detected: bool_field(object, "technical_issue_detected"),
        needs_retry: bool_field(object, "needs_retry"),
        next_action,
    })
}

fn next_action_from(object: &Map<String, Value>) -> NextAction {
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(ActionKind::parse)
        .unwrap_or_default();

    let follow_up_details = object
        .get("follow_up_details")
        .or_else(|| object.get("follow_up_question_details"))
        .and_then(Value::as_object)
        .and_then(|details| {
            let original_question = details.get("original_question")?.as_str()?.to_string();
            Some(FollowUpDetails {
                original_question,
                identified_gap: string_field(details, "identified_gap"),
            })
        });

    NextAction {
        kind,
        message: string_field(object, "message"),
        follow_up_details,
    }
}

fn score_from(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    raw.round().clamp(0.0, 10.0) as u8
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Find the first balanced JSON object in free text.
///
/// Anything up to the last `</think>` tag is discarded first. Braces inside
/// string literals do not count toward the balance.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let body = match raw.rfind("</think>") {
        Some(pos) => &raw[pos + "</think>".len()..],
        None => raw,
    };

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_json() {
        let raw = r#"{
            "score": 8,
            "feedback": "Clear structure.",
            "strengths": ["Specific metrics"],
            "tips": ["Mention the team size"],
            "technical_issue_detected": false,
            "needs_retry": false,
            "next_action": {"type": "continue", "message": "Nice work."}
        }"#;

        let judgment = parse_text_judgment(raw).unwrap();
        assert_eq!(judgment.score, 8);
        assert_eq!(judgment.strengths, vec!["Specific metrics"]);
        assert_eq!(judgment.next_action.kind, ActionKind::Continue);
        assert!(!judgment.wants_retry());
    }

    #[test]
    fn test_parse_with_reasoning_prefix() {
        let raw = r#"<think>The user said {something}.</think>
            Okay, here is the result: {"score": 6, "feedback": "Good {start}", "next_action": {"type": "ask_follow_up", "message": "Can you expand?", "follow_up_details": {"original_question": "Tell me about a conflict.", "identified_gap": "outcome"}}} trailing"#;

        let judgment = parse_text_judgment(raw).unwrap();
        assert_eq!(judgment.score, 6);
        assert_eq!(judgment.feedback, "Good {start}");
        assert_eq!(judgment.next_action.kind, ActionKind::AskFollowUp);
        let details = judgment.next_action.follow_up_details.unwrap();
        assert_eq!(details.original_question, "Tell me about a conflict.");
        assert_eq!(details.identified_gap, "outcome");
    }

    #[test]
    fn test_score_is_clamped() {
        let high = parse_text_judgment(r#"{"score": 14, "next_action": {"type": "continue"}}"#).unwrap();
        assert_eq!(high.score, 10);

        let negative = parse_text_judgment(r#"{"score": -3, "next_action": {"type": "continue"}}"#).unwrap();
        assert_eq!(negative.score, 0);

        let text = parse_text_judgment(r#"{"score": "7", "next_action": {"type": "continue"}}"#).unwrap();
        assert_eq!(text.score, 7);
    }

    #[test]
    fn test_unknown_action_becomes_continue() {
        let judgment =
            parse_text_judgment(r#"{"score": 5, "next_action": {"type": "dance", "message": "?"}}"#).unwrap();
        assert_eq!(judgment.next_action.kind, ActionKind::Continue);
    }

    #[test]
    fn test_root_level_action_fields() {
        let judgment =
            parse_text_judgment(r#"{"score": 4, "type": "suggest_exit", "message": "Let's stop here."}"#).unwrap();
        assert_eq!(judgment.next_action.kind, ActionKind::SuggestExit);
        assert_eq!(judgment.next_action.message, "Let's stop here.");
    }

    #[test]
    fn test_missing_action_requests_retry() {
        let judgment = parse_text_judgment(r#"{"score": 5, "feedback": "ok"}"#).unwrap();
        assert_eq!(judgment.next_action.kind, ActionKind::RetryQuestion);
        assert!(judgment.wants_retry());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_text_judgment("I could not evaluate this answer.").is_err());
        assert!(parse_text_judgment("{ unterminated").is_err());
    }

    #[test]
    fn test_technical_issue_judgment() {
        let judgment = TextJudgment::technical_issue();
        assert!(judgment.technical_issue_detected);
        assert!(judgment.wants_retry());
        assert_eq!(judgment.next_action.message, EMPTY_ANSWER_MESSAGE);
    }
}
