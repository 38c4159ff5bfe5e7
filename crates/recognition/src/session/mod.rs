//! Per-connection session state.
//!
//! A `Session` owns every piece of mutable state for one client: the audio
//! buffers, the mode and timing hints, and one opaque cache token per engine.
//! It is created when the connection is accepted and dropped when the
//! connection closes; nothing in here is shared across sessions.

pub mod accumulator;
pub mod gate;
mod scheduler;

use std::sync::Arc;

use crate::config::SessionDefaults;
use crate::engine::{CacheToken, EngineSet};
use crate::protocol::RecognitionMode;
use accumulator::FrameAccumulator;
use gate::VadGate;

/// State for the streaming recognizer: the opaque cache plus the flag and
/// chunk triple that ride along with every call.
#[derive(Debug, Default)]
pub struct OnlineAsrState {
    pub cache: CacheToken,
    /// True iff the client declared `is_speaking = false` or VAD declared a
    /// speech end since the last online invocation.
    pub is_final: bool,
    pub chunk_size: [usize; 3],
}

/// State for the offline recognizer. Hotwords pass through unvalidated.
#[derive(Debug, Default)]
pub struct OfflineAsrState {
    pub cache: CacheToken,
    pub hotwords: Option<String>,
}

#[derive(Debug, Default)]
pub struct PuncState {
    pub cache: CacheToken,
}

pub struct Session {
    engines: Arc<EngineSet>,
    pub(crate) mode: RecognitionMode,
    pub(crate) is_speaking: bool,
    pub(crate) chunk_interval: usize,
    pub(crate) wav_name: String,
    pub(crate) frames: FrameAccumulator,
    pub(crate) gate: VadGate,
    pub(crate) online: OnlineAsrState,
    pub(crate) offline: OfflineAsrState,
    pub(crate) punc: PuncState,
}

impl Session {
    /// Builds a fresh session with its own engine caches. Engines are
    /// assumed already loaded and warm.
    pub fn new(defaults: &SessionDefaults, engines: Arc<EngineSet>) -> Self {
        Self {
            engines,
            mode: defaults.mode,
            is_speaking: true,
            chunk_interval: defaults.chunk_interval,
            wav_name: defaults.wav_name.clone(),
            frames: FrameAccumulator::new(),
            gate: VadGate::new(),
            online: OnlineAsrState {
                chunk_size: defaults.chunk_size,
                ..OnlineAsrState::default()
            },
            offline: OfflineAsrState::default(),
            punc: PuncState::default(),
        }
    }

    pub(crate) fn engines(&self) -> Arc<EngineSet> {
        Arc::clone(&self.engines)
    }

    pub fn mode(&self) -> RecognitionMode {
        self.mode
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Read-only view of the buffer state, for disconnect logging and tests.
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            mode: self.mode,
            is_speaking: self.is_speaking,
            speech_active: self.gate.speech_active(),
            retained_frames: self.frames.retained_len(),
            offline_frames: self.frames.offline_len(),
            online_frames: self.frames.online_len(),
            elapsed_ms: self.frames.elapsed_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub mode: RecognitionMode,
    pub is_speaking: bool,
    pub speech_active: bool,
    pub retained_frames: usize,
    pub offline_frames: usize,
    pub online_frames: usize,
    pub elapsed_ms: u64,
}
