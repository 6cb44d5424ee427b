//! # Incremental Audio Buffer
//!
//! Accumulates the audio fragments of one spoken answer and decides when to
//! attempt a partial transcription (live caption) and when the utterance is
//! over and should be transcribed in full.
//!
//! ## Key Features:
//! - **Count-based partials**: a partial is due once `incremental_threshold`
//!   fragments have arrived since the last checkpoint
//! - **Overlap**: partial audio can include a few already-covered fragments
//!   for context at the boundary
//! - **Final flush**: triggered when the client's voice activity detector
//!   reports silence, or when no fragment has arrived for `final_timeout`
//!
//! One buffer per connection, owned by its WebSocket actor. No locking.

use std::time::{Duration, Instant};

/// Which fragments a partial transcription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialStrategy {
    /// Only fragments after the checkpoint
    NewChunksOnly,
    /// The last `overlap_fragments` checkpointed fragments plus all new ones
    Overlapping { overlap_fragments: usize },
}

impl Default for PartialStrategy {
    fn default() -> Self {
        PartialStrategy::Overlapping { overlap_fragments: 2 }
    }
}

#[derive(Debug, Clone)]
pub struct IncrementalBufferConfig {
    /// New fragments required before another partial attempt
    pub incremental_threshold: usize,

    /// Silence after the last fragment that ends the utterance
    pub final_timeout: Duration,

    pub strategy: PartialStrategy,
}

impl Default for IncrementalBufferConfig {
    fn default() -> Self {
        Self {
            incremental_threshold: 5,
            final_timeout: Duration::from_secs(2),
            strategy: PartialStrategy::default(),
        }
    }
}

/// Transcription work due after the buffer changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferAction {
    Nothing,
    /// Live caption for the utterance numbered `utterance`
    Partial { audio: Vec<u8>, utterance: u64 },
    /// The whole utterance. The buffer has already been cleared.
    Final { audio: Vec<u8> },
}

pub struct AudioIncrementalBuffer {
    /// Decoded fragments in arrival order
    fragments: Vec<Vec<u8>>,

    last_fragment_at: Option<Instant>,

    /// Number of fragments already covered by a partial attempt
    checkpoint: usize,

    /// Client-side voice activity flag from the most recent fragment
    is_speaking: bool,

    /// Bumped on every clear, so results for an earlier utterance can be told apart
    utterance: u64,

    config: IncrementalBufferConfig,
}

impl AudioIncrementalBuffer {
    pub fn new(config: IncrementalBufferConfig) -> Self {
        Self {
            fragments: Vec::new(),
            last_fragment_at: None,
            checkpoint: 0,
            is_speaking: false,
            utterance: 0,
            config,
        }
    }

    /// Add a fragment and report what should be transcribed next. A fragment
    /// flagged as silence ends the utterance. Otherwise a partial is due once
    /// enough new fragments have accumulated; its checkpoint is taken here,
    /// when the audio is snapshotted.
    pub fn push(&mut self, data: Vec<u8>, is_speaking: bool) -> BufferAction {
        self.push_at(data, is_speaking, Instant::now())
    }

    pub fn push_at(&mut self, data: Vec<u8>, is_speaking: bool, now: Instant) -> BufferAction {
        self.add_fragment_at(data, is_speaking, now);

        if self.should_flush_final_at(now) {
            return self.flush();
        }

        if self.should_transcribe_partial() {
            let audio = self.partial_audio();
            self.mark_checkpoint();
            return BufferAction::Partial {
                audio,
                utterance: self.utterance,
            };
        }

        BufferAction::Nothing
    }

    /// Periodic silence check.
    pub fn poll(&mut self) -> BufferAction {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> BufferAction {
        if self.should_flush_final_at(now) {
            self.flush()
        } else {
            BufferAction::Nothing
        }
    }

    /// Unconditional end of utterance, as on `audio_end`.
    pub fn flush(&mut self) -> BufferAction {
        match self.take_final() {
            Some(audio) => BufferAction::Final { audio },
            None => BufferAction::Nothing,
        }
    }

    pub fn add_fragment_at(&mut self, data: Vec<u8>, is_speaking: bool, now: Instant) {
        self.fragments.push(data);
        self.last_fragment_at = Some(now);
        self.is_speaking = is_speaking;
    }

    pub fn should_transcribe_partial(&self) -> bool {
        self.len() >= self.checkpoint + self.config.incremental_threshold
    }

    /// Audio for a partial attempt using the configured strategy.
    pub fn partial_audio(&self) -> Vec<u8> {
        self.partial_audio_with(self.config.strategy)
    }

    pub fn partial_audio_with(&self, strategy: PartialStrategy) -> Vec<u8> {
        let start = match strategy {
            PartialStrategy::NewChunksOnly => self.checkpoint,
            PartialStrategy::Overlapping { overlap_fragments } => {
                self.checkpoint.saturating_sub(overlap_fragments)
            }
        };
        self.fragments[start.min(self.len())..].concat()
    }

    /// Record that every fragment received so far has been covered by a
    /// partial attempt, whether or not that attempt succeeds.
    pub fn mark_checkpoint(&mut self) {
        self.checkpoint = self.len();
    }

    pub fn should_flush_final_at(&self, now: Instant) -> bool {
        if self.is_empty() {
            return false;
        }

        if !self.is_speaking() {
            return true;
        }

        let timed_out = self
            .last_fragment_at
            .is_some_and(|last| now.saturating_duration_since(last) >= self.config.final_timeout);

        timed_out && self.len() > self.checkpoint
    }

    /// Every fragment, ignoring checkpoints.
    pub fn final_audio(&self) -> Vec<u8> {
        self.fragments.concat()
    }

    /// Final audio followed by `clear`. `None` when the buffer is empty.
    pub fn take_final(&mut self) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }
        let audio = self.final_audio();
        self.clear();
        Some(audio)
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.last_fragment_at = None;
        self.checkpoint = 0;
        self.utterance = self.utterance.wrapping_add(1);
    }

    /// Number of the utterance currently being buffered.
    pub fn utterance(&self) -> u64 {
        self.utterance
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }
}
