//! # Interview Session Management
//!
//! Everything the server knows about one interview conversation lives here:
//! the per-session record, the question cursor, and the in-memory table that
//! maps session IDs to their records.
//!
//! ## Key Components:
//! - **SessionState**: readiness, phase, question index, attempt counters, pending analyses
//! - **QuestionSequencer**: cursor arithmetic over a session's question set
//! - **SessionStore**: concurrent table of live sessions, one mutex per session
//!
//! ## Locking Rules:
//! A session's mutex is held only while reading or mutating its record.
//! It is never held across a call into an analysis service.

pub mod questions; // Question records and the sequencer
pub mod state; // Per-session record and pending analyses
pub mod store; // Live session table

pub use questions::{CurrentQuestion, Question, QuestionSequencer, QuestionSet};
pub use state::{AnalysisStatus, PendingAnalyses, Phase, SessionMetadata, SessionSnapshot, SessionState};
pub use store::{SessionStore, SharedSession};
