//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerAction, PlayerId, RoomId};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

type WsSink = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let mut conn = Connection::new(player_id, state.clone());
    run_session(&mut conn, ws_sink, ws_stream).await;

    // Cleanup on disconnect
    state.directory.disconnect(player_id).await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Per-connection state: who this socket is and which room it listens to
struct Connection {
    player_id: PlayerId,
    state: AppState,
    limiter: ConnectionRateLimiter,
    room: Option<(RoomId, broadcast::Receiver<ServerMsg>)>,
}

impl Connection {
    fn new(player_id: PlayerId, state: AppState) -> Self {
        let limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
        Self {
            player_id,
            state,
            limiter,
            room: None,
        }
    }

    /// Handle one client message, returning the direct reply if there is one
    async fn dispatch(&mut self, msg: ClientMsg) -> Option<ServerMsg> {
        if let Some(claimed) = msg.player_id() {
            if claimed != self.player_id {
                warn!(player_id = %self.player_id, claimed = %claimed, "Message for another player ignored");
                return None;
            }
        }

        let directory = &self.state.directory;

        match msg {
            ClientMsg::JoinRoom { mode, .. } => {
                match directory.join_room(self.player_id, mode).await {
                    Ok(snapshot) => {
                        self.room = directory
                            .subscribe(&snapshot.room_id)
                            .map(|rx| (snapshot.room_id, rx));
                        Some(ServerMsg::JoinRoomAck {
                            success: true,
                            payload: Some(snapshot),
                            reason: None,
                        })
                    }
                    Err(e) => {
                        warn!(player_id = %self.player_id, error = %e, "Join failed");
                        Some(ServerMsg::JoinRoomAck {
                            success: false,
                            payload: None,
                            reason: Some(e.to_string()),
                        })
                    }
                }
            }
            ClientMsg::LeaveRoom { room_id, .. } => {
                let result = directory.leave_room(room_id, self.player_id).await;
                if self.room.as_ref().is_some_and(|(id, _)| *id == room_id) {
                    self.room = None;
                }
                Some(match result {
                    Ok(()) => ServerMsg::LeaveRoomAck {
                        success: true,
                        reason: None,
                    },
                    Err(e) => ServerMsg::LeaveRoomAck {
                        success: false,
                        reason: Some(e.to_string()),
                    },
                })
            }
            ClientMsg::StartGame { room_id } => {
                directory.start_game(room_id).await;
                None
            }
            ClientMsg::MoveTetromino { direction, .. } => {
                directory
                    .route_action(self.player_id, PlayerAction::Move(direction))
                    .await;
                None
            }
            ClientMsg::RotateTetromino { .. } => {
                directory
                    .route_action(self.player_id, PlayerAction::Rotate)
                    .await;
                None
            }
            ClientMsg::DropTetromino { .. } => {
                directory
                    .route_action(self.player_id, PlayerAction::Drop)
                    .await;
                None
            }
            ClientMsg::SwapTetromino { .. } => {
                directory
                    .route_action(self.player_id, PlayerAction::Hold)
                    .await;
                None
            }
            ClientMsg::Ping { t } => Some(ServerMsg::Pong { t }),
        }
    }

    /// Wait for the next broadcast of the room this connection listens to.
    /// Pends forever while outside a room.
    async fn next_room_event(&mut self) -> Result<ServerMsg, broadcast::error::RecvError> {
        match self.room.as_mut() {
            Some((_, rx)) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

/// Pump client messages in and room broadcasts out until either side closes
async fn run_session(
    conn: &mut Connection,
    mut ws_sink: WsSink,
    mut ws_stream: SplitStream<WebSocket>,
) {
    let player_id = conn.player_id;

    loop {
        tokio::select! {
            incoming = ws_stream.next() => {
                let Some(result) = incoming else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        if !conn.limiter.check_input() {
                            warn!(player_id = %player_id, "Rate limited input message");
                            continue;
                        }

                        let reply = match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => conn.dispatch(client_msg).await,
                            Err(e) => {
                                warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                                Some(ServerMsg::Error {
                                    code: "invalid_message".to_string(),
                                    message: e.to_string(),
                                })
                            }
                        };

                        if let Some(reply) = reply {
                            if let Err(e) = send_msg(&mut ws_sink, &reply).await {
                                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                                break;
                            }
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        warn!(player_id = %player_id, "Received binary message, ignoring");
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        info!(player_id = %player_id, "Client initiated close");
                        break;
                    }
                    Err(e) => {
                        error!(player_id = %player_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            event = conn.next_room_event() => {
                match event {
                    Ok(msg) => {
                        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Snapshots are full state; skipping stale ones is harmless
                        warn!(player_id = %player_id, lagged_count = n, "Client lagged, skipping snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(player_id = %player_id, "Room channel closed");
                        conn.room = None;
                    }
                }
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
