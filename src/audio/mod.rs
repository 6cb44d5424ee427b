//! # Audio Module
//!
//! Buffering for the candidate's spoken answers. Clients stream an answer
//! as base64-encoded fragments (or binary WebSocket frames), tagged with a
//! voice-activity flag. The buffer here decides when those fragments should
//! be transcribed, partially while speaking and fully once the answer ends.

pub mod buffer; // Incremental fragment buffer

pub use buffer::{AudioIncrementalBuffer, BufferAction, IncrementalBufferConfig, PartialStrategy};
