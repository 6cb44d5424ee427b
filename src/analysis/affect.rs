//! Compressed facial-expression features sent by the client, and the short
//! behavioral insight derived from them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Frames kept per session for trend detection.
pub const HISTORY_LEN: usize = 5;

/// Smallest change between consecutive frames that is reported as a trend.
const TREND_THRESHOLD: i16 = 15;

/// Per-frame expression metrics computed on the client. Every metric is on
/// a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectFeatures {
    pub smile: u8,
    pub eye_open: u8,
    pub brow_raise: u8,
    pub mouth_open: u8,
    pub tension: u8,
    pub symmetry: u8,
    /// Detection confidence of the client-side face tracker
    pub confidence: u8,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub frame_id: String,
}

/// Coarse band for a 0-100 metric.
pub fn level(value: u8) -> &'static str {
    match value {
        80.. => "very high",
        60..=79 => "high",
        40..=59 => "moderate",
        20..=39 => "low",
        _ => "very low",
    }
}

/// Coarse band for the tracker's detection confidence.
pub fn detection_quality(value: u8) -> &'static str {
    match value {
        90.. => "excellent",
        75..=89 => "good",
        50..=74 => "moderate",
        _ => "low",
    }
}

impl AffectFeatures {
    /// Values outside 0-100 are rejected before any analysis runs.
    pub fn validate(&self) -> Result<(), String> {
        let metrics = [
            ("smile", self.smile),
            ("eyeOpen", self.eye_open),
            ("browRaise", self.brow_raise),
            ("mouthOpen", self.mouth_open),
            ("tension", self.tension),
            ("symmetry", self.symmetry),
            ("confidence", self.confidence),
        ];

        match metrics.iter().find(|(_, value)| *value > 100) {
            Some((name, value)) => Err(format!("{} must be between 0 and 100, got {}", name, value)),
            None => Ok(()),
        }
    }

    /// Plain-text rendering of the metrics with their bands, used as
    /// evaluator context.
    pub fn describe(&self) -> String {
        format!(
            "Smile intensity: {}/100 ({})\n\
             Eye openness: {}/100 ({})\n\
             Eyebrow raise: {}/100 ({})\n\
             Mouth openness: {}/100 ({})\n\
             Facial tension: {}/100 ({})\n\
             Facial symmetry: {}/100 ({})\n\
             Detection quality: {}/100 ({})",
            self.smile,
            level(self.smile),
            self.eye_open,
            level(self.eye_open),
            self.brow_raise,
            level(self.brow_raise),
            self.mouth_open,
            level(self.mouth_open),
            self.tension,
            level(self.tension),
            self.symmetry,
            level(self.symmetry),
            self.confidence,
            detection_quality(self.confidence),
        )
    }
}

/// The most recent validated frames of one session.
#[derive(Debug, Clone, Default)]
pub struct AffectHistory {
    frames: VecDeque<AffectFeatures>,
}

impl AffectHistory {
    pub fn push(&mut self, features: AffectFeatures) {
        if self.frames.len() == HISTORY_LEN {
            self.frames.pop_front();
        }
        self.frames.push_back(features);
    }

    /// Changes of more than 15 points in smile, tension or eye openness
    /// between the last two frames. `None` until two frames are known.
    pub fn trends(&self) -> Option<String> {
        let n = self.frames.len();
        if n < 2 {
            return None;
        }
        let (previous, latest) = (&self.frames[n - 2], &self.frames[n - 1]);

        let checks = [
            (
                latest.smile,
                previous.smile,
                "Smile intensity has increased significantly",
                "Smile intensity has decreased significantly",
            ),
            (
                latest.tension,
                previous.tension,
                "Facial tension has increased",
                "Facial tension has decreased",
            ),
            (
                latest.eye_open,
                previous.eye_open,
                "Eye engagement has improved",
                "Eye engagement has reduced",
            ),
        ];

        let changes: Vec<&str> = checks
            .iter()
            .filter_map(|&(now, before, up, down)| {
                let delta = i16::from(now) - i16::from(before);
                if delta > TREND_THRESHOLD {
                    Some(up)
                } else if delta < -TREND_THRESHOLD {
                    Some(down)
                } else {
                    None
                }
            })
            .collect();

        Some(if changes.is_empty() {
            "RECENT TRENDS: Expression remains stable".to_string()
        } else {
            format!("RECENT TRENDS:\n- {}", changes.join("\n- "))
        })
    }
}

/// Short behavioral observation about the candidate's on-camera presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectInsight {
    pub feedback: String,
}

impl AffectInsight {
    pub fn new(feedback: impl Into<String>) -> Self {
        Self {
            feedback: feedback.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> AffectFeatures {
        AffectFeatures {
            smile: 85,
            eye_open: 50,
            brow_raise: 20,
            mouth_open: 10,
            tension: 15,
            symmetry: 90,
            confidence: 95,
            timestamp: 1_700_000_000,
            frame_id: "frame-1".to_string(),
        }
    }

    #[test]
    fn test_level_bands() {
        assert_eq!(level(100), "very high");
        assert_eq!(level(80), "very high");
        assert_eq!(level(79), "high");
        assert_eq!(level(40), "moderate");
        assert_eq!(level(20), "low");
        assert_eq!(level(19), "very low");
        assert_eq!(detection_quality(90), "excellent");
        assert_eq!(detection_quality(49), "low");
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = r#"{"smile":10,"eyeOpen":20,"browRaise":30,"mouthOpen":40,
                       "tension":50,"symmetry":60,"confidence":70,
                       "timestamp":123,"frameId":"f-9"}"#;
        let parsed: AffectFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.eye_open, 20);
        assert_eq!(parsed.frame_id, "f-9");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut f = features();
        assert!(f.validate().is_ok());
        f.tension = 140;
        let err = f.validate().unwrap_err();
        assert!(err.contains("tension"));
    }

    fn history(frames: &[(u8, u8, u8)]) -> AffectHistory {
        let mut history = AffectHistory::default();
        for &(smile, tension, eye_open) in frames {
            history.push(AffectFeatures {
                smile,
                tension,
                eye_open,
                ..features()
            });
        }
        history
    }

    #[test]
    fn test_trends_need_two_frames() {
        assert_eq!(AffectHistory::default().trends(), None);
        assert_eq!(history(&[(50, 50, 50)]).trends(), None);
    }

    #[test]
    fn test_trends_report_large_changes_with_direction() {
        let trends = history(&[(40, 60, 50), (60, 40, 70)]).trends().unwrap();
        assert_eq!(
            trends,
            "RECENT TRENDS:\n- Smile intensity has increased significantly\n\
             - Facial tension has decreased\n- Eye engagement has improved"
        );

        let trends = history(&[(80, 20, 80), (60, 40, 60)]).trends().unwrap();
        assert!(trends.contains("Smile intensity has decreased significantly"));
        assert!(trends.contains("Facial tension has increased"));
        assert!(trends.contains("Eye engagement has reduced"));
    }

    #[test]
    fn test_change_of_exactly_threshold_is_stable() {
        let trends = history(&[(50, 50, 50), (65, 35, 65)]).trends().unwrap();
        assert_eq!(trends, "RECENT TRENDS: Expression remains stable");

        let trends = history(&[(50, 50, 50), (50, 66, 50)]).trends().unwrap();
        assert_eq!(trends, "RECENT TRENDS:\n- Facial tension has increased");
    }

    #[test]
    fn test_history_is_bounded_and_compares_latest_pair() {
        let history = history(&[(0, 0, 0), (0, 0, 0), (10, 10, 10), (20, 20, 20), (30, 30, 30), (90, 30, 30)]);
        assert_eq!(history.frames.len(), HISTORY_LEN);
        assert_eq!(
            history.trends().unwrap(),
            "RECENT TRENDS:\n- Smile intensity has increased significantly"
        );
    }

    #[test]
    fn test_describe_includes_bands() {
        let text = features().describe();
        assert!(text.contains("Smile intensity: 85/100 (very high)"));
        assert!(text.contains("Detection quality: 95/100 (excellent)"));
    }
}
