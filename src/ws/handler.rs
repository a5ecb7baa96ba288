//! WebSocket upgrade handler and per-connection session loop

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::{headers::Cookie, TypedHeader};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::config::Config;
use crate::game::session::CLOSE_HELLO_TIMEOUT;
use crate::game::{ArenaHandle, PlayerId};
use crate::http::identity::{extract_token, verify_jwt, AuthError};
use crate::util::time::HELLO_TIMEOUT;
use crate::ws::outbound::{Frame, FrameReceiver, Outbound};
use crate::ws::protocol::ClientMsg;

/// Close code used when the arena cannot take the connection
const CLOSE_UNAVAILABLE: u16 = 1011;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token, optional when identity tokens are not configured
    #[serde(default)]
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    cookie: Option<TypedHeader<Cookie>>,
    State(state): State<AppState>,
) -> Response {
    if state.upgrade_limiter.check().is_err() {
        warn!("WebSocket upgrade rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many connections").into_response();
    }

    let token = extract_token(query.token.as_deref(), cookie.as_ref().map(|c| &c.0));
    let trusted_name = match resolve_identity(&state.config, token) {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, trusted_name, state))
}

/// Display name vouched for by a session token.
///
/// `None` means a guest who picks their own name in `hello`.
pub fn resolve_identity(config: &Config, token: Option<&str>) -> Result<Option<String>, AuthError> {
    match (config.jwt_secret.as_deref(), token) {
        (Some(secret), Some(token)) => {
            let claims = verify_jwt(token, secret)?;
            Ok(Some(claims.display_name().to_string()))
        }
        _ => Ok(None),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, trusted_name: Option<String>, state: AppState) {
    state.arena.start_broadcasting();

    let (ws_sink, mut ws_stream) = socket.split();
    let (outbound, frames) = Outbound::channel();
    let mut shutdown = outbound.shutdown_signal();
    let writer = tokio::spawn(write_frames(ws_sink, frames));

    let Some(requested_name) = handshake(&mut ws_stream, &outbound).await else {
        if outbound.is_closing() {
            let _ = writer.await;
        } else {
            writer.abort();
        }
        return;
    };

    let name = trusted_name.unwrap_or(requested_name);
    let id = match state.arena.hello(name, outbound.clone()).await {
        Ok(id) => id,
        Err(e) => {
            info!(error = %e, "Hello rejected");
            // no-op when the arena already queued its own close frame
            outbound.close(CLOSE_UNAVAILABLE, "arena unavailable");
            let _ = writer.await;
            return;
        }
    };

    read_messages(&mut ws_stream, &id, &state.arena, &mut shutdown).await;

    state.arena.disconnect(id).await;
    writer.abort();
}

/// Wait up to the hello timeout for a handshake, closing with 4000 when it never comes
async fn handshake<S, E>(stream: &mut S, outbound: &Outbound) -> Option<String>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    match tokio::time::timeout(HELLO_TIMEOUT, wait_for_hello(stream)).await {
        Ok(Some(name)) => Some(name),
        Ok(None) => {
            debug!("Connection closed before hello");
            None
        }
        Err(_) => {
            debug!("Hello timeout, closing connection");
            outbound.close(CLOSE_HELLO_TIMEOUT, "hello timeout");
            None
        }
    }
}

/// Read until a well-formed `hello`; everything else is ignored
async fn wait_for_hello<S, E>(stream: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Hello { name }) => return Some(name),
                _ => debug!("Ignoring message before hello"),
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Forward decoded client messages to the arena until either side hangs up
async fn read_messages<S, E>(
    stream: &mut S,
    id: &PlayerId,
    arena: &ArenaHandle,
    shutdown: &mut watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if !arena.send(id.clone(), msg).await {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(player_id = %id, error = %e, "Dropping malformed frame");
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    debug!(player_id = %id, "Received binary message, ignoring");
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(player_id = %id, "Client closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(player_id = %id, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!(player_id = %id, "Connection shut down by server");
                break;
            }
        }
    }
}

/// Drain queued frames into the socket until closed
async fn write_frames(mut sink: SplitSink<WebSocket, Message>, mut frames: FrameReceiver) {
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Text(text) => {
                let len = text.len();
                let sent = sink.send(Message::Text(text.to_string())).await;
                frames.written(len);
                if let Err(e) = sent {
                    debug!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            Frame::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: Cow::Borrowed(reason),
                    })))
                    .await;
                break;
            }
        }
    }
    frames.finish();
}
