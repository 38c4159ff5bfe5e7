//! Layered settings for the sonant server.
//!
//! Values come from `sonant.toml` (optional, in the working directory),
//! overridden by `SONANT__`-prefixed environment variables with `__` as the
//! section separator, e.g. `SONANT__SERVER__PORT=10095` or
//! `SONANT__ENGINES__DEVICE=cpu`. The CLI applies its own overrides on top of
//! the loaded `Settings`.

use config::{Config, Environment, File};
use serde::Deserialize;

pub use config::ConfigError;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engines: EngineSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// PEM certificate path. TLS is enabled when both cert and key are set.
    pub certfile: Option<String>,
    pub keyfile: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10095,
            certfile: None,
            keyfile: None,
        }
    }
}

/// One sidecar inference worker: the argv to spawn plus the model it serves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub command: Vec<String>,
    pub model: String,
    pub revision: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            model: String::new(),
            revision: "v2.0.4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// "cuda" or "cpu", forwarded to every worker.
    pub device: String,
    pub asr: WorkerSettings,
    pub asr_online: WorkerSettings,
    pub vad: WorkerSettings,
    /// Punctuation is optional: an empty model disables the stage.
    pub punc: WorkerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device: "cuda".to_string(),
            asr: WorkerSettings {
                command: worker_argv("offline"),
                model: "iic/speech_paraformer-large_asr_nat-zh-cn-16k-common-vocab8404-pytorch"
                    .to_string(),
                ..WorkerSettings::default()
            },
            asr_online: WorkerSettings {
                command: worker_argv("online"),
                model: "iic/speech_paraformer-large_asr_nat-zh-cn-16k-common-vocab8404-online"
                    .to_string(),
                ..WorkerSettings::default()
            },
            vad: WorkerSettings {
                command: worker_argv("vad"),
                model: "iic/speech_fsmn_vad_zh-cn-16k-common-pytorch".to_string(),
                ..WorkerSettings::default()
            },
            punc: WorkerSettings {
                command: worker_argv("punc"),
                model: "iic/punc_ct-transformer_zh-cn-common-vad_realtime-vocab272727"
                    .to_string(),
                ..WorkerSettings::default()
            },
        }
    }
}

fn worker_argv(stage: &str) -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        format!("sonant_workers.{stage}"),
    ]
}

/// Per-session defaults applied at connection accept; the client can change
/// all of these through control messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// "2pass", "online" or "offline".
    pub mode: String,
    pub chunk_interval: usize,
    pub chunk_size: Vec<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: "2pass".to_string(),
            chunk_interval: 10,
            chunk_size: vec![5, 10, 5],
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("sonant").required(false))
            .add_source(Environment::with_prefix("SONANT").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_protocol() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 10095);
        assert_eq!(settings.session.mode, "2pass");
        assert_eq!(settings.session.chunk_interval, 10);
        assert_eq!(settings.session.chunk_size, vec![5, 10, 5]);
        assert!(settings.server.certfile.is_none());
    }

    #[test]
    fn punc_stage_can_be_disabled() {
        let mut settings = Settings::default();
        settings.engines.punc.model.clear();
        assert!(settings.engines.punc.model.is_empty());
    }
}
