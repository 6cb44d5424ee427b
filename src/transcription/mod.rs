//! # Transcription Module
//!
//! Speech-to-text for candidate answers. The actual recognizer is an
//! external service reached through `TranscriptionPort`; this module adds
//! the partial/final distinction the conversation needs and keeps
//! throughput statistics for the metrics endpoint.
//!
//! ## Partial vs Final:
//! - **Partial**: fired while the candidate is still speaking, shown as a live caption
//! - **Final**: fired once the utterance ends, becomes the answer that gets evaluated

pub mod engine; // Transcription processing engine

pub use engine::TranscriptionEngine;
