//! # Answer Analysis
//!
//! Types and logic for evaluating a candidate's answer along two
//! independent dimensions and merging the results.
//!
//! ## Key Components:
//! - **judgment**: scored text evaluation and its lenient parser
//! - **affect**: expression features and behavioral insight
//! - **feedback**: formatting judgments into candidate-facing text
//! - **coordinator**: the barrier that merges both evaluations exactly once per question

pub mod affect; // Expression features and insight
pub mod coordinator; // Dual-analysis merge barrier
pub mod feedback; // Candidate-facing feedback text
pub mod judgment; // Text judgments and parsing

pub use affect::{AffectFeatures, AffectHistory, AffectInsight};
pub use coordinator::{MergeClaim, UnifiedFeedbackCoordinator};
pub use feedback::format_feedback;
pub use judgment::{parse_text_judgment, ActionKind, TextJudgment};
