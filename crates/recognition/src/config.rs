use crate::protocol::RecognitionMode;

/// Session state applied at connection accept. Clients can change all of
/// these through control messages.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub mode: RecognitionMode,
    /// Run the online pass after every N audio frames.
    pub chunk_interval: usize,
    /// Streaming-ASR lookback/chunk/lookahead triple.
    pub chunk_size: [usize; 3],
    pub wav_name: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            mode: RecognitionMode::TwoPass,
            chunk_interval: 10,
            chunk_size: [5, 10, 5],
            wav_name: "microphone".to_string(),
        }
    }
}

/// One sidecar worker: argv to spawn plus the model it should load.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub command: Vec<String>,
    pub model: String,
    pub revision: String,
    pub device: String,
}

/// Worker specs for the full engine set. `punc` is optional; without it the
/// offline text passes through unpunctuated.
#[derive(Debug, Clone)]
pub struct EnginesSpec {
    pub vad: WorkerSpec,
    pub asr_online: WorkerSpec,
    pub asr_offline: WorkerSpec,
    pub punc: Option<WorkerSpec>,
}
