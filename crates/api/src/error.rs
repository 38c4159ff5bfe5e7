use std::path::PathBuf;

/// Errors that prevent the server from starting. Session-level failures are
/// handled inside the websocket task and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load settings: {0}")]
    Settings(#[from] sonant_config::ConfigError),

    #[error("invalid bind address {addr}: {source}")]
    BindAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("TLS requires both a certificate and a key file")]
    TlsPairIncomplete,

    #[error("failed to read TLS material from {path}: {source}")]
    TlsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
