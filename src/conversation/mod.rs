//! # Conversation Engine
//!
//! The interview state machine and its wire vocabulary.
//!
//! ## Key Components:
//! - **events**: tagged inbound and outbound WebSocket events
//! - **messages**: prompt texts and the readiness check
//! - **policy**: what happens after an answer has been judged
//! - **orchestrator**: applies events to sessions and calls the analysis ports

pub mod events; // Wire events
pub mod messages; // Prompt texts
pub mod orchestrator; // Session state machine
pub mod policy; // Turn outcome rules

pub use events::{AudioFragment, InboundEvent, OutboundEvent, SessionInit};
pub use orchestrator::{ConversationOrchestrator, ConversationStats};
