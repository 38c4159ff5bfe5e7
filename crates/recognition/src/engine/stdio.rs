//! Sidecar inference workers.
//!
//! Each engine runs as a child process that speaks a length-prefixed JSON
//! protocol over stdin/stdout: a little-endian `u32` byte count followed by
//! one JSON document, in both directions. Audio travels base64-encoded; the
//! per-session cache rides along as an opaque JSON value that the worker
//! returns updated. Calls on one worker are serialized behind a mutex on the
//! child's pipes, so a shared worker is safe to invoke from many sessions.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    CacheToken, EngineSet, OfflineAsrEngine, OnlineContext, PunctuationEngine,
    StreamingAsrEngine, VadEngine, VadSegment,
};
use crate::config::{EnginesSpec, WorkerSpec};

/// Upper bound on a single reply frame; anything larger is a protocol error.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{name} worker has an empty command")]
    EmptyCommand { name: &'static str },
    #[error("failed to spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} worker i/o failed: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} worker protocol violation: {reason}")]
    Protocol { name: &'static str, reason: String },
    #[error("{name} worker reported: {message}")]
    Worker { name: &'static str, message: String },
}

struct WorkerIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One spawned sidecar process.
pub struct StdioWorker {
    name: &'static str,
    io: Mutex<WorkerIo>,
    _child: Child,
}

impl StdioWorker {
    /// Spawns the worker and runs the `ping` handshake. The model, revision
    /// and device are appended to the configured argv the same way the
    /// server itself receives them.
    pub async fn spawn(name: &'static str, spec: &WorkerSpec) -> Result<Self, WorkerError> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or(WorkerError::EmptyCommand { name })?;

        let mut child = Command::new(program)
            .args(args)
            .arg("--model")
            .arg(&spec.model)
            .arg("--revision")
            .arg(&spec.revision)
            .arg("--device")
            .arg(&spec.device)
            .arg("--serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn { name, source })?;

        let stdin = child.stdin.take().ok_or_else(|| WorkerError::Protocol {
            name,
            reason: "missing stdin pipe".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| WorkerError::Protocol {
            name,
            reason: "missing stdout pipe".to_string(),
        })?;

        let worker = Self {
            name,
            io: Mutex::new(WorkerIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            _child: child,
        };

        worker.call(json!({ "action": "ping" })).await?;
        info!(worker = name, model = %spec.model, "inference worker ready");
        Ok(worker)
    }

    /// Sends one request frame and reads one reply frame. A reply without
    /// `"ok": true` is surfaced as a worker error.
    pub async fn call(&self, request: Value) -> Result<Value, WorkerError> {
        let name = self.name;
        let body = serde_json::to_vec(&request).map_err(|e| WorkerError::Protocol {
            name,
            reason: e.to_string(),
        })?;

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(&(body.len() as u32).to_le_bytes())
            .await
            .map_err(|source| WorkerError::Io { name, source })?;
        io.stdin
            .write_all(&body)
            .await
            .map_err(|source| WorkerError::Io { name, source })?;
        io.stdin
            .flush()
            .await
            .map_err(|source| WorkerError::Io { name, source })?;

        let mut len = [0u8; 4];
        io.stdout
            .read_exact(&mut len)
            .await
            .map_err(|source| WorkerError::Io { name, source })?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(WorkerError::Protocol {
                name,
                reason: format!("oversized reply frame ({len} bytes)"),
            });
        }
        let mut buf = vec![0u8; len];
        io.stdout
            .read_exact(&mut buf)
            .await
            .map_err(|source| WorkerError::Io { name, source })?;
        drop(io);

        let reply: Value = serde_json::from_slice(&buf).map_err(|e| WorkerError::Protocol {
            name,
            reason: e.to_string(),
        })?;
        if reply.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified failure")
                .to_string();
            return Err(WorkerError::Worker { name, message });
        }
        Ok(reply)
    }
}

fn reply_cache(reply: &Value) -> CacheToken {
    CacheToken::from_value(reply.get("cache").cloned().unwrap_or(Value::Null))
}

fn reply_text(reply: &Value) -> String {
    reply
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_segments(reply: &Value) -> Result<Vec<VadSegment>, WorkerError> {
    let raw = match reply.get("segments") {
        Some(Value::Array(items)) => items,
        Some(_) | None => {
            return Err(WorkerError::Protocol {
                name: "vad",
                reason: "reply missing segments array".to_string(),
            });
        }
    };
    raw.iter()
        .map(|seg| {
            let pair = seg.as_array().filter(|p| p.len() == 2);
            let (start, end) = match pair {
                Some(p) => (p[0].as_i64(), p[1].as_i64()),
                None => (None, None),
            };
            match (start, end) {
                (Some(start_ms), Some(end_ms)) => Ok(VadSegment { start_ms, end_ms }),
                _ => Err(WorkerError::Protocol {
                    name: "vad",
                    reason: format!("malformed segment {seg}"),
                }),
            }
        })
        .collect()
}

pub struct StdioVad {
    worker: StdioWorker,
}

#[async_trait]
impl VadEngine for StdioVad {
    async fn detect(
        &self,
        audio: &[u8],
        cache: CacheToken,
    ) -> anyhow::Result<(Vec<VadSegment>, CacheToken)> {
        let reply = self
            .worker
            .call(json!({
                "action": "detect",
                "audio": BASE64.encode(audio),
                "cache": cache.into_value(),
            }))
            .await?;
        let segments = parse_segments(&reply)?;
        Ok((segments, reply_cache(&reply)))
    }
}

pub struct StdioStreamingAsr {
    worker: StdioWorker,
}

#[async_trait]
impl StreamingAsrEngine for StdioStreamingAsr {
    async fn recognize(
        &self,
        audio: &[u8],
        ctx: &OnlineContext,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        let reply = self
            .worker
            .call(json!({
                "action": "recognize",
                "audio": BASE64.encode(audio),
                "is_final": ctx.is_final,
                "chunk_size": ctx.chunk_size,
                "cache": cache.into_value(),
            }))
            .await?;
        Ok((reply_text(&reply), reply_cache(&reply)))
    }
}

pub struct StdioOfflineAsr {
    worker: StdioWorker,
}

#[async_trait]
impl OfflineAsrEngine for StdioOfflineAsr {
    async fn recognize(
        &self,
        audio: &[u8],
        hotwords: Option<&str>,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        let mut request = json!({
            "action": "recognize",
            "audio": BASE64.encode(audio),
            "cache": cache.into_value(),
        });
        if let Some(hotwords) = hotwords {
            request["hotwords"] = Value::String(hotwords.to_string());
        }
        let reply = self.worker.call(request).await?;
        Ok((reply_text(&reply), reply_cache(&reply)))
    }
}

pub struct StdioPunctuation {
    worker: StdioWorker,
}

#[async_trait]
impl PunctuationEngine for StdioPunctuation {
    async fn punctuate(
        &self,
        text: &str,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        let reply = self
            .worker
            .call(json!({
                "action": "punctuate",
                "text": text,
                "cache": cache.into_value(),
            }))
            .await?;
        Ok((reply_text(&reply), reply_cache(&reply)))
    }
}

/// Spawns the configured workers and assembles the engine set. Workers load
/// their models before answering the handshake, so this is the expensive,
/// run-once part of process startup.
pub async fn load_engines(spec: &EnginesSpec) -> Result<EngineSet, WorkerError> {
    debug!("spawning inference workers");
    let (vad, asr_online, asr_offline) = tokio::try_join!(
        StdioWorker::spawn("vad", &spec.vad),
        StdioWorker::spawn("asr-online", &spec.asr_online),
        StdioWorker::spawn("asr-offline", &spec.asr_offline),
    )?;

    let punc = match &spec.punc {
        Some(punc_spec) => Some(StdioWorker::spawn("punc", punc_spec).await?),
        None => None,
    };

    Ok(EngineSet {
        vad: Arc::new(StdioVad { worker: vad }),
        asr_online: Arc::new(StdioStreamingAsr { worker: asr_online }),
        asr_offline: Arc::new(StdioOfflineAsr {
            worker: asr_offline,
        }),
        punc: punc.map(|worker| Arc::new(StdioPunctuation { worker }) as Arc<dyn PunctuationEngine>),
    })
}
