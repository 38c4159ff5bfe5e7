pub mod config;
pub mod engine;
pub mod protocol;
pub mod session;

pub use config::{EnginesSpec, SessionDefaults, WorkerSpec};
pub use engine::{CacheToken, EngineSet, OnlineContext, VadSegment};
pub use protocol::{ControlFrame, RecognitionMode, ServerMessage, TranscriptMessage};
pub use session::{Session, SessionStats};
