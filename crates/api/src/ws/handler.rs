use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use sonant_recognition::{ServerMessage, Session};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Outbound messages queued toward the writer task. Bounded so a slow
/// client or engine backpressures the receive loop instead of growing a
/// queue.
const OUTBOUND_BUFFER: usize = 32;

/// Guard that aborts a spawned task when dropped.
///
/// `tokio::spawn` returns a `JoinHandle` whose `Drop` impl detaches (does NOT
/// abort) the task. This wrapper ensures the writer is cancelled if the
/// connection future is cancelled.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "websocket connected");

    // First connection pays for engine loading. A failed load closes only
    // this connection; the next one retries.
    let engines = match state.engines().await {
        Ok(engines) => engines,
        Err(error) => {
            warn!(%connection_id, %error, "engine load failed, closing connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    state.registry.register(connection_id);
    let mut session = Session::new(&state.session_defaults(), engines);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    // Sends are decoupled from the receive loop, but the channel preserves
    // the order the scheduler emitted.
    let mut writer = AbortOnDrop(tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    }));

    while let Some(inbound) = receiver.next().await {
        let replies = match inbound {
            Ok(Message::Text(text)) => session.on_text(text.as_str()).await,
            Ok(Message::Binary(frame)) => session.on_audio(frame).await,
            Ok(Message::Ping(data)) => {
                if out_tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(error) => {
                warn!(%connection_id, %error, "websocket receive error");
                break;
            }
        };

        if forward(&out_tx, replies).await.is_err() {
            break;
        }
    }

    // Let the writer drain whatever is still queued, then tear down.
    drop(out_tx);
    let _ = (&mut writer.0).await;

    let stats = session.snapshot();
    if let Some(connected_for) = state.registry.unregister(&connection_id) {
        info!(
            %connection_id,
            ?connected_for,
            mode = ?stats.mode,
            elapsed_audio_ms = stats.elapsed_ms,
            "websocket disconnected"
        );
    }
    debug!(%connection_id, ?stats, "session state released");
}

async fn forward(
    out_tx: &mpsc::Sender<Message>,
    replies: Vec<ServerMessage>,
) -> Result<(), mpsc::error::SendError<Message>> {
    for reply in replies {
        out_tx.send(Message::text(reply.to_json())).await?;
    }
    Ok(())
}
