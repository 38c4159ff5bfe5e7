use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use sonant_api::error::StartupError;
use sonant_api::state::AppState;
use sonant_config::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Streaming speech transcription websocket server.
#[derive(Parser, Debug)]
#[command(name = "sonant-api", version)]
struct Args {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    asr_model: Option<String>,
    #[arg(long)]
    asr_model_revision: Option<String>,
    #[arg(long)]
    asr_model_online: Option<String>,
    #[arg(long)]
    asr_model_online_revision: Option<String>,
    #[arg(long)]
    vad_model: Option<String>,
    #[arg(long)]
    vad_model_revision: Option<String>,
    /// Pass an empty string to disable punctuation restoration.
    #[arg(long)]
    punc_model: Option<String>,
    #[arg(long)]
    punc_model_revision: Option<String>,

    /// "cuda" or "cpu".
    #[arg(long)]
    device: Option<String>,

    /// PEM certificate path; enables TLS together with --keyfile.
    #[arg(long)]
    certfile: Option<PathBuf>,
    #[arg(long)]
    keyfile: Option<PathBuf>,
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    let set = |target: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            *target = value.clone();
        }
    };

    set(&mut settings.server.host, &args.host);
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    set(&mut settings.engines.asr.model, &args.asr_model);
    set(&mut settings.engines.asr.revision, &args.asr_model_revision);
    set(&mut settings.engines.asr_online.model, &args.asr_model_online);
    set(
        &mut settings.engines.asr_online.revision,
        &args.asr_model_online_revision,
    );
    set(&mut settings.engines.vad.model, &args.vad_model);
    set(&mut settings.engines.vad.revision, &args.vad_model_revision);
    set(&mut settings.engines.punc.model, &args.punc_model);
    set(&mut settings.engines.punc.revision, &args.punc_model_revision);
    set(&mut settings.engines.device, &args.device);

    if let Some(certfile) = &args.certfile {
        settings.server.certfile = Some(certfile.display().to_string());
    }
    if let Some(keyfile) = &args.keyfile {
        settings.server.keyfile = Some(keyfile.display().to_string());
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load()?;
    apply_overrides(&mut settings, &args);

    let addr_str = format!("{}:{}", settings.server.host, settings.server.port);
    let addr: SocketAddr = addr_str
        .parse()
        .map_err(|source| StartupError::BindAddr {
            addr: addr_str,
            source,
        })?;

    let tls = match (&settings.server.certfile, &settings.server.keyfile) {
        (Some(certfile), Some(keyfile)) => {
            let certfile = PathBuf::from(certfile);
            let keyfile = PathBuf::from(keyfile);
            let config = RustlsConfig::from_pem_file(&certfile, &keyfile)
                .await
                .map_err(|source| StartupError::TlsRead {
                    path: certfile.clone(),
                    source,
                })?;
            Some(config)
        }
        (None, None) => None,
        _ => return Err(StartupError::TlsPairIncomplete),
    };

    let state = AppState::new(settings);
    let app = sonant_api::build_router(state);

    let handle = Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    info!(%addr, tls = tls.is_some(), "websocket server listening; engines load on first connection");

    match tls {
        Some(config) => {
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?
        }
        None => {
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?
        }
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: Handle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
        handle.graceful_shutdown(Some(Duration::from_secs(5)));
    }
}
