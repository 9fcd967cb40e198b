//! WebSocket chat transport
//!
//! One socket carries many requests, answered one at a time. A reply is
//! relayed as `typing`, zero or more `chunk` frames, then exactly one `done`
//! or `error`. Closing the socket mid-reply drops the turn stream, which stops
//! the backend and leaves no assistant turn behind.

use super::handlers::resolve_model;
use super::types::{ClientEvent, ServerEvent};
use super::AppState;
use crate::orchestrator::TurnStream;
use crate::store::SessionStore;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The peer went away; stop serving this connection
struct Disconnected;

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    let hello = ServerEvent::Connected {
        connection_id: connection_id.clone(),
    };
    if send_event(&mut sender, &hello).await.is_err() {
        return;
    }

    while let Some(incoming) = receiver.next().await {
        let text = match incoming {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let outcome = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::SendMessage {
                message,
                session_id,
                model,
            }) => {
                relay_reply(&state, &mut sender, &mut receiver, message, session_id, model).await
            }
            Ok(ClientEvent::NewConversation) => new_conversation(&state, &mut sender).await,
            Err(e) => {
                let frame = ServerEvent::Error {
                    error: format!("Invalid message: {e}"),
                    session_id: None,
                };
                send_event(&mut sender, &frame).await
            }
        };

        if outcome.is_err() {
            break;
        }
    }

    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}

async fn new_conversation(state: &AppState, sender: &mut WsSender) -> Result<(), Disconnected> {
    let frame = match state.store().create().await {
        Ok(conversation) => ServerEvent::ConversationCreated {
            session_id: conversation.session_id.clone(),
            conversation,
        },
        Err(e) => ServerEvent::Error {
            error: e.to_string(),
            session_id: None,
        },
    };
    send_event(sender, &frame).await
}

async fn relay_reply(
    state: &AppState,
    sender: &mut WsSender,
    receiver: &mut WsReceiver,
    message: String,
    session_id: Option<String>,
    model: Option<String>,
) -> Result<(), Disconnected> {
    let model = match resolve_model(state, model.as_deref()) {
        Ok(model) => model,
        Err(e) => {
            let frame = ServerEvent::Error {
                error: e.to_string(),
                session_id,
            };
            return send_event(sender, &frame).await;
        }
    };

    send_event(sender, &ServerEvent::Typing { is_typing: true }).await?;

    let (session_id, stream) = match state.orchestrator.handle(session_id.clone(), &message, model).await {
        Ok(started) => started,
        Err(e) => {
            send_event(sender, &ServerEvent::Typing { is_typing: false }).await?;
            let frame = ServerEvent::Error {
                error: e.to_string(),
                session_id,
            };
            return send_event(sender, &frame).await;
        }
    };

    let mut frames = reply_frames(session_id.clone(), stream);
    loop {
        tokio::select! {
            frame = frames.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                if matches!(frame, ServerEvent::Done { .. } | ServerEvent::Error { .. }) {
                    send_event(sender, &ServerEvent::Typing { is_typing: false }).await?;
                }
                send_event(sender, &frame).await?;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    tracing::info!(session_id = %session_id, "Client left mid-reply, abandoning turn");
                    return Err(Disconnected);
                }
                Some(Ok(Message::Text(_))) => {
                    let busy = ServerEvent::Error {
                        error: "A reply is already in progress".to_string(),
                        session_id: Some(session_id.clone()),
                    };
                    send_event(sender, &busy).await?;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Frames for one reply: a `chunk` per piece of text, then one `done` or `error`
fn reply_frames(session_id: String, stream: TurnStream) -> BoxStream<'static, ServerEvent> {
    async_stream::stream! {
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    yield ServerEvent::Chunk {
                        chunk,
                        session_id: session_id.clone(),
                    };
                }
                Err(e) => {
                    yield ServerEvent::Error {
                        error: e.to_string(),
                        session_id: Some(session_id),
                    };
                    return;
                }
            }
        }
        yield ServerEvent::Done {
            session_id,
            timestamp: Utc::now(),
        };
    }
    .boxed()
}

async fn send_event(sender: &mut WsSender, event: &ServerEvent) -> Result<(), Disconnected> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await.map_err(|e| {
        tracing::debug!(error = %e, "WebSocket send failed");
        Disconnected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::llm::{ModelSelector, ProviderRegistry};
    use crate::orchestrator::testing::MockProvider;
    use crate::orchestrator::TurnError;
    use crate::store::FileStore;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn turn_stream(items: Vec<Result<String, TurnError>>) -> TurnStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_reply_frames_end_with_done() {
        let frames: Vec<ServerEvent> = reply_frames(
            "s1".to_string(),
            turn_stream(vec![Ok("Hel".to_string()), Ok("lo".to_string())]),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], ServerEvent::Chunk { chunk, session_id } if chunk == "Hel" && session_id == "s1"));
        assert!(matches!(&frames[1], ServerEvent::Chunk { chunk, .. } if chunk == "lo"));
        assert!(matches!(&frames[2], ServerEvent::Done { session_id, .. } if session_id == "s1"));
    }

    #[tokio::test]
    async fn test_reply_frames_error_is_terminal() {
        let frames: Vec<ServerEvent> = reply_frames(
            "s2".to_string(),
            turn_stream(vec![
                Ok("partial".to_string()),
                Err(TurnError::AllProvidersFailed { attempts: vec![] }),
                Ok("never sent".to_string()),
            ]),
        )
        .collect()
        .await;

        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[1], ServerEvent::Error { session_id: Some(id), .. } if id == "s2"));
    }

    #[tokio::test]
    async fn test_reply_frames_empty_reply_still_done() {
        let frames: Vec<ServerEvent> = reply_frames("s3".to_string(), turn_stream(vec![])).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], ServerEvent::Done { .. }));
    }

    // ============================================================
    // Socket loop over a real connection
    // ============================================================

    async fn serve(registry: ProviderRegistry) -> (TempDir, AppState, String) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let state = AppState::new(store, Arc::new(registry));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = create_router(state.clone(), None);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (dir, state, format!("ws://{addr}/ws"))
    }

    fn local_llama(provider: MockProvider) -> ProviderRegistry {
        ProviderRegistry::empty().with_provider(ModelSelector::LocalLlama, Arc::new(provider))
    }

    /// Connect and consume the `connected` greeting
    async fn connect(url: &str) -> Client {
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let hello = next_frame(&mut client).await;
        assert_eq!(hello["type"], "connected");
        assert!(hello["connection_id"].is_string());
        client
    }

    async fn next_frame(client: &mut Client) -> Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send_json(client: &mut Client, value: &Value) {
        client.send(WsMessage::Text(value.to_string())).await.unwrap();
    }

    fn ask(message: &str) -> Value {
        json!({"type": "send_message", "message": message, "model": "local-llama"})
    }

    #[tokio::test]
    async fn test_socket_relays_reply_then_done() {
        let (_dir, state, url) = serve(local_llama(MockProvider::chunks("local-llama", &["hi ", "there"]))).await;
        let mut client = connect(&url).await;

        send_json(&mut client, &ask("hello")).await;

        let mut frames = Vec::new();
        loop {
            let frame = next_frame(&mut client).await;
            let done = frame["type"] == "done";
            frames.push(frame);
            if done {
                break;
            }
        }

        let kinds: Vec<_> = frames.iter().map(|f| f["type"].as_str().unwrap().to_string()).collect();
        assert_eq!(kinds, vec!["typing", "chunk", "chunk", "typing", "done"]);
        assert_eq!(frames[0]["is_typing"], true);
        assert_eq!(frames[1]["chunk"], "hi ");
        assert_eq!(frames[2]["chunk"], "there");
        assert_eq!(frames[3]["is_typing"], false);

        let session_id = frames[4]["session_id"].as_str().unwrap();
        let session = state.store().get(session_id).await.unwrap();
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[1].text, "hi there");

        // the connection keeps serving requests
        send_json(&mut client, &json!({"type": "new_conversation"})).await;
        let created = next_frame(&mut client).await;
        assert_eq!(created["type"], "conversation_created");
        assert_eq!(created["conversation"]["title"], "New Conversation");
    }

    #[tokio::test]
    async fn test_socket_reports_bad_frames_and_stays_open() {
        let (_dir, _state, url) = serve(ProviderRegistry::empty()).await;
        let mut client = connect(&url).await;

        send_json(&mut client, &json!({"type": "launch_rockets"})).await;
        let frame = next_frame(&mut client).await;
        assert_eq!(frame["type"], "error");
        assert!(frame["error"].as_str().unwrap().starts_with("Invalid message"));

        send_json(&mut client, &json!({"type": "send_message", "message": "hi", "model": "gpt-9"})).await;
        let frame = next_frame(&mut client).await;
        assert_eq!(frame["type"], "error");

        send_json(&mut client, &json!({"type": "new_conversation"})).await;
        assert_eq!(next_frame(&mut client).await["type"], "conversation_created");
    }

    #[tokio::test]
    async fn test_socket_rejects_message_while_replying() {
        let (_dir, _state, url) = serve(local_llama(MockProvider::hang_after("local-llama", &["partial"]))).await;
        let mut client = connect(&url).await;

        send_json(&mut client, &ask("first")).await;
        assert_eq!(next_frame(&mut client).await["type"], "typing");
        let chunk = next_frame(&mut client).await;
        assert_eq!(chunk["chunk"], "partial");

        send_json(&mut client, &ask("second")).await;
        let busy = next_frame(&mut client).await;
        assert_eq!(busy["type"], "error");
        assert_eq!(busy["error"], "A reply is already in progress");
        assert_eq!(busy["session_id"], chunk["session_id"]);
    }

    #[tokio::test]
    async fn test_socket_close_mid_reply_saves_only_user_turn() {
        let (_dir, state, url) = serve(local_llama(MockProvider::hang_after("local-llama", &["partial"]))).await;
        let mut client = connect(&url).await;

        send_json(&mut client, &ask("are you there")).await;
        assert_eq!(next_frame(&mut client).await["type"], "typing");
        let chunk = next_frame(&mut client).await;
        let session_id = chunk["session_id"].as_str().unwrap().to_string();

        client.close(None).await.unwrap();
        drop(client);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let session = state.store().get(&session_id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].text, "are you there");
    }
}
