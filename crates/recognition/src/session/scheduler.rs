//! The per-session scheduling state machine.
//!
//! Two event classes drive a session: control messages and binary audio
//! frames. Each handler returns the outbound messages produced by that
//! event, in emission order; the connection layer sends them before
//! processing the next inbound message, so output order always matches
//! event order.
//!
//! Two independent triggers force an offline flush: the client's explicit
//! `is_speaking = false` (push-to-talk) and a VAD-detected speech end
//! (open mic). Both reset the same buffers so no audio is counted twice
//! into the next utterance. The online pass is decoupled from VAD entirely;
//! partial captions keep flowing even when the detector is noisy or down.

use bytes::Bytes;
use tracing::{debug, warn};

use super::Session;
use crate::engine::{CacheToken, OnlineContext};
use crate::protocol::{ControlFrame, RecognitionMode, ServerMessage, TranscriptMessage};

/// Which pass produced a result, for the rewritten `mode` field.
#[derive(Debug, Clone, Copy)]
enum Pass {
    Online,
    Offline,
}

fn mode_label(mode: RecognitionMode, pass: Pass) -> &'static str {
    match (mode, pass) {
        (RecognitionMode::TwoPass, Pass::Online) => "2pass-online",
        (RecognitionMode::TwoPass, Pass::Offline) => "2pass-offline",
        (mode, _) => mode.as_str(),
    }
}

impl Session {
    /// Handles one inbound text frame.
    ///
    /// Malformed JSON drops the message and keeps the session alive. A
    /// `ping` short-circuits everything else. Field application follows
    /// arrival conventions: `is_speaking` (and its flush) first, `mode`
    /// last, so a mode change never applies retroactively to the flush in
    /// the same message.
    pub async fn on_text(&mut self, raw: &str) -> Vec<ServerMessage> {
        let frame = match ControlFrame::parse(raw) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "dropping malformed control message");
                return Vec::new();
            }
        };
        if !frame.unknown.is_empty() {
            debug!(
                keys = ?frame.unknown.keys().collect::<Vec<_>>(),
                "ignoring unknown control fields"
            );
        }
        if frame.is_ping() {
            return vec![ServerMessage::Pong];
        }

        let mut out = Vec::new();

        if let Some(speaking) = frame.is_speaking {
            self.is_speaking = speaking;
            self.online.is_final = !speaking;
            if !speaking && !self.frames.offline_is_empty() {
                debug!(
                    frames = self.frames.offline_len(),
                    elapsed_ms = self.frames.elapsed_ms(),
                    "client stop, flushing offline pass"
                );
                if self.run_offline_flush(&mut out).await {
                    self.reset_after_client_stop();
                }
            }
        }

        if let Some(interval) = frame.chunk_interval {
            if interval == 0 {
                warn!("ignoring chunk_interval of 0");
            } else {
                self.chunk_interval = interval;
            }
        }
        if let Some(name) = frame.wav_name {
            self.wav_name = name;
        }
        if let Some(chunk_size) = frame.chunk_size {
            match chunk_size.resolve() {
                Some(triple) => self.online.chunk_size = triple,
                None => warn!("ignoring malformed chunk_size"),
            }
        }
        if let Some(hotwords) = frame.hotwords {
            self.offline.hotwords = Some(hotwords.join());
        }
        if let Some(mode) = frame.mode.as_deref() {
            match RecognitionMode::parse(mode) {
                Some(mode) => self.mode = mode,
                None => warn!(mode, "ignoring unknown mode"),
            }
        }

        out
    }

    /// Handles one inbound audio frame.
    pub async fn on_audio(&mut self, frame: Bytes) -> Vec<ServerMessage> {
        let mut out = Vec::new();

        self.frames.push(frame.clone());
        self.online.is_final = self.gate.end_pending();

        if self.frames.online_len() % self.chunk_interval == 0 || self.online.is_final {
            if self.mode.runs_online() {
                self.run_online_pass(&mut out).await;
            }
            // cleared in every mode so the queue stays bounded
            self.frames.clear_online();
        }

        let engines = self.engines();
        let boundary = self.gate.observe(&engines, &frame).await;
        if boundary.end_ms.is_some() {
            debug!(
                start_ms = ?boundary.start_ms,
                end_ms = ?boundary.end_ms,
                frames = self.frames.offline_len(),
                elapsed_ms = self.frames.elapsed_ms(),
                "vad speech end, flushing offline pass"
            );
            if self.run_offline_flush(&mut out).await {
                self.reset_after_vad_end();
            }
        }

        out
    }

    async fn run_online_pass(&mut self, out: &mut Vec<ServerMessage>) {
        let audio = self.frames.concat_online();
        if audio.is_empty() {
            return;
        }
        let ctx = OnlineContext {
            is_final: self.online.is_final,
            chunk_size: self.online.chunk_size,
        };
        let engines = self.engines();
        match engines
            .asr_online
            .recognize(&audio, &ctx, self.online.cache.clone())
            .await
        {
            Ok((text, cache)) => {
                self.online.cache = cache;
                if !text.is_empty() {
                    out.push(ServerMessage::Transcript(TranscriptMessage {
                        mode: mode_label(self.mode, Pass::Online).to_string(),
                        text,
                        wav_name: self.wav_name.clone(),
                        is_final: self.is_speaking,
                    }));
                }
            }
            Err(error) => warn!(%error, "online pass failed"),
        }
    }

    /// Runs the offline pass over the whole offline queue. Returns whether
    /// the post-flush reset should run: a failed recognizer call keeps the
    /// queues so the next trigger retries with the same audio. An empty
    /// queue or a mode without an offline pass skips the call but still
    /// allows the reset.
    async fn run_offline_flush(&mut self, out: &mut Vec<ServerMessage>) -> bool {
        if !self.mode.runs_offline() {
            return true;
        }
        let audio = self.frames.concat_offline();
        if audio.is_empty() {
            return true;
        }
        let engines = self.engines();
        let text = match engines
            .asr_offline
            .recognize(
                &audio,
                self.offline.hotwords.as_deref(),
                self.offline.cache.clone(),
            )
            .await
        {
            Ok((text, cache)) => {
                self.offline.cache = cache;
                text
            }
            Err(error) => {
                warn!(%error, bytes = audio.len(), "offline pass failed, keeping buffered audio");
                return false;
            }
        };

        let text = self.apply_punctuation(text).await;
        if !text.is_empty() {
            out.push(ServerMessage::Transcript(TranscriptMessage {
                mode: mode_label(self.mode, Pass::Offline).to_string(),
                text,
                wav_name: self.wav_name.clone(),
                // offline-mode results are always authoritative
                is_final: self.mode == RecognitionMode::Offline || self.is_speaking,
            }));
        }
        true
    }

    async fn apply_punctuation(&mut self, text: String) -> String {
        if text.is_empty() {
            return text;
        }
        let Some(punc) = self.engines().punc.clone() else {
            return text;
        };
        match punc.punctuate(&text, self.punc.cache.clone()).await {
            Ok((restored, cache)) => {
                self.punc.cache = cache;
                restored
            }
            Err(error) => {
                warn!(%error, "punctuation failed, emitting unpunctuated text");
                text
            }
        }
    }

    /// Reset after a client-stop flush: the next utterance starts from a
    /// clean slate, including the VAD state and the frame history.
    fn reset_after_client_stop(&mut self) {
        self.frames.clear_offline();
        self.frames.clear_online();
        self.frames.clear_retained();
        self.frames.reset_elapsed();
        self.online.cache = CacheToken::new();
        self.gate.reset_cache();
        self.gate.deactivate();
    }

    /// Reset after a VAD-end flush: the detector keeps its cache (it is
    /// mid-stream), and a short look-back of frame history is retained.
    fn reset_after_vad_end(&mut self) {
        self.frames.clear_offline();
        self.frames.clear_online();
        self.frames.truncate_retained();
        self.online.cache = CacheToken::new();
    }
}
