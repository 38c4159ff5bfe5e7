//! End-to-end websocket tests: a real bound server with stub engines, driven
//! by a tokio-tungstenite client speaking the wire protocol.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use sonant_api::state::AppState;
use sonant_config::Settings;
use sonant_recognition::engine::{
    OfflineAsrEngine, PunctuationEngine, StreamingAsrEngine, VadEngine,
};
use sonant_recognition::{CacheToken, EngineSet, OnlineContext, VadSegment};

struct SilentVad;

#[async_trait]
impl VadEngine for SilentVad {
    async fn detect(
        &self,
        _audio: &[u8],
        cache: CacheToken,
    ) -> anyhow::Result<(Vec<VadSegment>, CacheToken)> {
        Ok((Vec::new(), cache))
    }
}

struct EchoOnline;

#[async_trait]
impl StreamingAsrEngine for EchoOnline {
    async fn recognize(
        &self,
        audio: &[u8],
        _ctx: &OnlineContext,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        Ok((format!("partial {} bytes", audio.len()), cache))
    }
}

struct FixedOffline;

#[async_trait]
impl OfflineAsrEngine for FixedOffline {
    async fn recognize(
        &self,
        _audio: &[u8],
        _hotwords: Option<&str>,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        Ok(("hello world".to_string(), cache))
    }
}

struct TrailingPunc;

#[async_trait]
impl PunctuationEngine for TrailingPunc {
    async fn punctuate(
        &self,
        text: &str,
        cache: CacheToken,
    ) -> anyhow::Result<(String, CacheToken)> {
        Ok((format!("{text}."), cache))
    }
}

/// Binds the server on an ephemeral port and returns its address.
async fn spawn_server() -> std::net::SocketAddr {
    let engines = Arc::new(EngineSet {
        vad: Arc::new(SilentVad),
        asr_online: Arc::new(EchoOnline),
        asr_offline: Arc::new(FixedOffline),
        punc: Some(Arc::new(TrailingPunc)),
    });
    let state = AppState::with_engines(Settings::default(), engines);
    let app = sonant_api::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn frame_60ms() -> Vec<u8> {
    vec![0u8; 60 * 32]
}

#[tokio::test]
async fn offline_session_over_the_wire() {
    let addr = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    ws.send(WsMessage::text(
        r#"{"mode":"offline","wav_name":"meeting.wav","is_speaking":true}"#,
    ))
    .await
    .unwrap();
    for _ in 0..3 {
        ws.send(WsMessage::binary(frame_60ms())).await.unwrap();
    }
    ws.send(WsMessage::text(r#"{"is_speaking": false}"#))
        .await
        .unwrap();

    let reply = ws.next().await.unwrap().unwrap();
    let value: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(value["mode"], "offline");
    assert_eq!(value["text"], "hello world.");
    assert_eq!(value["wav_name"], "meeting.wav");
    assert_eq!(value["is_final"], true);

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn two_pass_emits_partials_then_corrected_text() {
    let addr = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    ws.send(WsMessage::text(r#"{"mode":"2pass","chunk_interval":2}"#))
        .await
        .unwrap();
    for _ in 0..4 {
        ws.send(WsMessage::binary(frame_60ms())).await.unwrap();
    }

    for _ in 0..2 {
        let reply = ws.next().await.unwrap().unwrap();
        let value: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(value["mode"], "2pass-online");
        assert_eq!(value["text"], format!("partial {} bytes", 2 * 60 * 32));
    }

    ws.send(WsMessage::text(r#"{"is_speaking": false}"#))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let value: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(value["mode"], "2pass-offline");
    assert_eq!(value["text"], "hello world.");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn ping_gets_exactly_one_pong() {
    let addr = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    ws.send(WsMessage::text(r#"{"type":"ping"}"#)).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let value: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "pong");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn malformed_control_frame_keeps_the_session_usable() {
    let addr = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();

    ws.send(WsMessage::text("{not json")).await.unwrap();
    // no reply for the bad frame; the next heartbeat still answers
    ws.send(WsMessage::text(r#"{"type":"ping"}"#)).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let value: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "pong");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn engine_load_failure_closes_connection_but_server_survives() {
    // Empty worker argvs make the lazy engine load fail deterministically.
    let mut settings = Settings::default();
    settings.engines.vad.command = Vec::new();
    settings.engines.asr.command = Vec::new();
    settings.engines.asr_online.command = Vec::new();
    settings.engines.punc.model.clear();

    let state = AppState::new(settings);
    let app = sonant_api::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Both connections are closed cleanly: the failed load never wedges the
    // process, and each new connection retries the load.
    for _ in 0..2 {
        let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
        match ws.next().await {
            None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => {}
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }

    // The HTTP surface is still alive and no session stayed registered.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    let start = response.find('{').unwrap();
    let end = response.rfind('}').unwrap();
    let value: Value = serde_json::from_str(&response[start..=end]).unwrap();
    assert_eq!(value["active_sessions"], 0);
}

#[tokio::test]
async fn health_reports_active_sessions() {
    let addr = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    // prove the connection is registered before probing
    ws.send(WsMessage::text(r#"{"type":"ping"}"#)).await.unwrap();
    let _ = ws.next().await.unwrap().unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let start = response.find('{').unwrap();
    let end = response.rfind('}').unwrap();
    let value: Value = serde_json::from_str(&response[start..=end]).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["active_sessions"], 1);

    ws.close(None).await.unwrap();
}
