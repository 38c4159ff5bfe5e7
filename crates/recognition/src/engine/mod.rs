//! Uniform interface to the inference engines.
//!
//! The session driver treats every engine as a black-box stateful function:
//! audio (or text) plus an opaque per-session cache in, a result plus the
//! updated cache out. Engines are shared across sessions behind `Arc` and
//! must either tolerate concurrent invocation or serialize internally; the
//! caches are what make a call session-scoped.

pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Opaque per-session engine state.
///
/// The driver never inspects the value; it hands the token to the engine and
/// stores whatever comes back. Tokens start out as JSON `null`, which every
/// engine treats as "fresh session".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheToken(Value);

impl CacheToken {
    pub fn new() -> Self {
        Self(Value::Null)
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// A raw speech segment reported by the VAD engine. Offsets are
/// milliseconds relative to the session start; `-1` means "not detected in
/// this call".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadSegment {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Per-call context for the streaming recognizer.
#[derive(Debug, Clone, Copy)]
pub struct OnlineContext {
    /// True when this chunk closes the utterance (client stop or VAD end).
    pub is_final: bool,
    /// Lookback/chunk/lookahead triple, in frames.
    pub chunk_size: [usize; 3],
}

#[async_trait]
pub trait VadEngine: Send + Sync + 'static {
    /// Classifies one audio frame. Returns the segments detected in this
    /// call (usually zero or one) and the updated cache.
    async fn detect(
        &self,
        audio: &[u8],
        cache: CacheToken,
    ) -> anyhow::Result<(Vec<VadSegment>, CacheToken)>;
}

#[async_trait]
pub trait StreamingAsrEngine: Send + Sync + 'static {
    /// Low-latency partial recognition over the buffered chunk.
    async fn recognize(
        &self,
        audio: &[u8],
        ctx: &OnlineContext,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)>;
}

#[async_trait]
pub trait OfflineAsrEngine: Send + Sync + 'static {
    /// High-accuracy recognition over a complete utterance. Hotwords are
    /// passed through unvalidated.
    async fn recognize(
        &self,
        audio: &[u8],
        hotwords: Option<&str>,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)>;
}

#[async_trait]
pub trait PunctuationEngine: Send + Sync + 'static {
    async fn punctuate(
        &self,
        text: &str,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)>;
}

/// The set of engine handles a session drives. Loaded once per process and
/// shared by every connection.
#[derive(Clone)]
pub struct EngineSet {
    pub vad: Arc<dyn VadEngine>,
    pub asr_online: Arc<dyn StreamingAsrEngine>,
    pub asr_offline: Arc<dyn OfflineAsrEngine>,
    /// Absent when no punctuation model is configured; offline text then
    /// passes through unchanged.
    pub punc: Option<Arc<dyn PunctuationEngine>>,
}
