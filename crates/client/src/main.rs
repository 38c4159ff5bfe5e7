//! WAV-streaming test client.
//!
//! Streams a 16 kHz mono 16-bit WAV file to a sonant server at real-time
//! pace, prints partial and corrected transcripts as they arrive, then sends
//! the stop signal and waits for the final offline result.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sonant-client", version)]
struct Args {
    /// Server endpoint.
    #[arg(long, default_value = "ws://127.0.0.1:10095/")]
    url: String,

    /// 16 kHz mono 16-bit PCM WAV file to stream.
    wav: PathBuf,

    /// "2pass", "online" or "offline".
    #[arg(long, default_value = "2pass")]
    mode: String,

    #[arg(long, default_value_t = 10)]
    chunk_interval: usize,

    #[arg(long, default_value = "5,10,5")]
    chunk_size: String,

    /// Space-separated hotword list.
    #[arg(long)]
    hotwords: Option<String>,

    /// Milliseconds of audio per binary frame.
    #[arg(long, default_value_t = 60)]
    frame_ms: u64,

    /// Seconds to wait for the final transcript after the stop signal.
    #[arg(long, default_value_t = 10)]
    final_timeout: u64,
}

fn read_pcm(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    anyhow::ensure!(
        spec.channels == 1
            && spec.sample_rate == 16_000
            && spec.bits_per_sample == 16
            && spec.sample_format == hound::SampleFormat::Int,
        "expected 16kHz mono 16-bit PCM, got {}ch {}Hz {}bit",
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
    );

    let mut pcm = Vec::new();
    for sample in reader.into_samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(pcm)
}

fn print_transcript(value: &Value) {
    let mode = value["mode"].as_str().unwrap_or("?");
    let text = value["text"].as_str().unwrap_or_default();
    let marker = if value["is_final"].as_bool().unwrap_or(false) {
        "*"
    } else {
        " "
    };
    println!("{marker}[{mode}] {text}");
}

fn is_corrected(value: &Value) -> bool {
    matches!(value["mode"].as_str(), Some("offline") | Some("2pass-offline"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let pcm = read_pcm(&args.wav)?;
    let frame_bytes = (args.frame_ms as usize) * 32;
    let wav_name = args
        .wav
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "microphone".to_string());

    info!(url = %args.url, bytes = pcm.len(), %wav_name, "connecting");
    let (ws, _) = connect_async(&args.url).await.context("connect failed")?;
    let (mut sink, mut stream) = ws.split();

    let mut config = json!({
        "mode": args.mode,
        "chunk_interval": args.chunk_interval,
        "chunk_size": args.chunk_size,
        "wav_name": wav_name,
        "is_speaking": true,
    });
    if let Some(hotwords) = &args.hotwords {
        config["hotwords"] = json!(hotwords);
    }
    sink.send(Message::text(config.to_string())).await?;

    // Print transcripts as they arrive while audio is still flowing.
    let printer = tokio::spawn(async move {
        let mut last_corrected = false;
        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                _ => continue,
            };
            match serde_json::from_str::<Value>(message.as_str()) {
                Ok(value) if value["type"] == "pong" => {}
                Ok(value) => {
                    print_transcript(&value);
                    last_corrected = is_corrected(&value);
                }
                Err(error) => warn!(%error, "unparseable server message"),
            }
            if last_corrected {
                break;
            }
        }
        last_corrected
    });

    let mut pacer = tokio::time::interval(Duration::from_millis(args.frame_ms));
    for frame in pcm.chunks(frame_bytes) {
        pacer.tick().await;
        sink.send(Message::binary(frame.to_vec())).await?;
    }

    sink.send(Message::text(r#"{"is_speaking": false}"#.to_string()))
        .await?;
    info!("stream finished, waiting for final transcript");

    match tokio::time::timeout(Duration::from_secs(args.final_timeout), printer).await {
        Ok(Ok(true)) => info!("received corrected transcript"),
        Ok(_) => warn!("server closed before a corrected transcript arrived"),
        Err(_) => warn!("timed out waiting for the final transcript"),
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}
