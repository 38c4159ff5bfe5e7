use std::sync::Arc;

use sonant_config::Settings;
use sonant_recognition::engine::stdio;
use sonant_recognition::{EngineSet, EnginesSpec, SessionDefaults, WorkerSpec};
use tokio::sync::OnceCell;
use tracing::info;

use crate::ws::registry::SessionRegistry;

/// Shared server state.
///
/// Engines load lazily on the first connection. The `OnceCell` gives
/// at-most-once semantics under concurrent first connections; a failed load
/// leaves the cell empty, so a later connection retries instead of wedging
/// the process.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    engines: Arc<OnceCell<Arc<EngineSet>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(SessionRegistry::new()),
            engines: Arc::new(OnceCell::new()),
        }
    }

    /// State with the engines already resolved, bypassing the sidecar
    /// loader. Used by tests and embedders that bring their own engines.
    pub fn with_engines(settings: Settings, engines: Arc<EngineSet>) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(SessionRegistry::new()),
            engines: Arc::new(OnceCell::from(engines)),
        }
    }

    pub async fn engines(&self) -> anyhow::Result<Arc<EngineSet>> {
        let set = self
            .engines
            .get_or_try_init(|| async {
                info!("loading inference engines");
                let spec = engines_spec(&self.settings);
                let set = stdio::load_engines(&spec).await?;
                Ok::<_, anyhow::Error>(Arc::new(set))
            })
            .await?;
        Ok(Arc::clone(set))
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        let session = &self.settings.session;
        let defaults = SessionDefaults::default();
        SessionDefaults {
            mode: sonant_recognition::RecognitionMode::parse(&session.mode)
                .unwrap_or(defaults.mode),
            chunk_interval: if session.chunk_interval > 0 {
                session.chunk_interval
            } else {
                defaults.chunk_interval
            },
            chunk_size: <[usize; 3]>::try_from(session.chunk_size.clone())
                .unwrap_or(defaults.chunk_size),
            wav_name: defaults.wav_name,
        }
    }
}

fn engines_spec(settings: &Settings) -> EnginesSpec {
    let engines = &settings.engines;
    let worker = |w: &sonant_config::WorkerSettings| WorkerSpec {
        command: w.command.clone(),
        model: w.model.clone(),
        revision: w.revision.clone(),
        device: engines.device.clone(),
    };
    EnginesSpec {
        vad: worker(&engines.vad),
        asr_online: worker(&engines.asr_online),
        asr_offline: worker(&engines.asr),
        // an empty punctuation model disables the stage
        punc: (!engines.punc.model.is_empty()).then(|| worker(&engines.punc)),
    }
}
