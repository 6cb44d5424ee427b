//! Turns a `TextJudgment` into the spoken-style text sent to the candidate.

use crate::analysis::judgment::TextJudgment;

/// Opening sentence chosen by score band.
pub fn opening_line(score: u8) -> String {
    match score {
        9.. => format!("Excellent response! You scored {}/10.", score),
        7..=8 => format!("Good job on your answer! You scored {}/10.", score),
        5..=6 => format!(
            "You're on the right track, but there's room for improvement. You scored {}/10.",
            score
        ),
        3..=4 => format!("Your response needs significant development. You scored {}/10.", score),
        _ => format!(
            "This response requires much more detail and structure. You scored {}/10.",
            score
        ),
    }
}

/// Opening line, evaluator feedback, strengths, then tips. Empty parts are
/// skipped and the rest joined with single spaces. Each list is closed as a
/// sentence.
pub fn format_feedback(judgment: &TextJudgment) -> String {
    let strengths = list_sentence("Here's what you did well", &judgment.strengths);
    let tips = list_sentence("Tips for next time", &judgment.tips);

    let opening = opening_line(judgment.score);
    join_parts([
        opening.as_str(),
        judgment.feedback.as_str(),
        strengths.as_str(),
        tips.as_str(),
    ])
}

/// `"<label>: a, b."`, or empty when there are no items.
fn list_sentence(label: &str, items: &[String]) -> String {
    let joined = items
        .iter()
        .map(|item| item.trim().trim_end_matches('.'))
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    if joined.is_empty() {
        String::new()
    } else {
        format!("{}: {}.", label, joined)
    }
}

/// Merged feedback used when the summary service is unavailable or the
/// affect analysis failed.
pub fn local_fallback_summary(judgment: &TextJudgment) -> String {
    let strength = judgment
        .strengths
        .first()
        .map(|s| format!("Your {} really came through.", s))
        .unwrap_or_else(|| "Your effort really came through.".to_string());
    let tip = judgment
        .tips
        .first()
        .map(String::as_str)
        .unwrap_or("keep practicing");

    format!(
        "Great! You scored a {}! {} One tip: {}. Ready for the next question?",
        judgment.score, strength, tip
    )
}

/// Join non-empty, trimmed fragments with single spaces.
pub fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
