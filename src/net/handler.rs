//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - WebSocket upgrade and session registration
//! - Decoding text frames into commands for the dispatcher
//! - Writing queued outbound events back as text frames
//! - Graceful disconnection

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, Result};
use crate::net::session::SessionId;
use crate::protocol::{decode_command, encode_event, Command, OutboundEvent};
use crate::AppState;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a WebSocket connection
    pub async fn handle_websocket(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling WebSocket connection");

        // Set TCP options before upgrade
        stream.set_nodelay(true)?;

        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| NetworkError::WebSocket(e.to_string()))?;

        info!(address = %addr, "WebSocket connection established");

        let (session, outbound_rx) = self.state.session_manager.create_session(addr)?;
        let session_id = session.id;

        let result = self.process_connection(ws_stream, session_id, outbound_rx).await;

        // Cleanup
        debug!(session_id = session_id, "Connection handler ending");
        self.state.dispatcher.disconnect(session_id);
        self.state.session_manager.remove(session_id);

        result
    }

    /// Main connection loop
    async fn process_connection(
        &self,
        ws_stream: WebSocketStream<TcpStream>,
        session_id: SessionId,
        mut outbound_rx: mpsc::Receiver<OutboundEvent>,
    ) -> Result<()> {
        let (mut sink, mut stream) = ws_stream.split();
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(session_id, &text) {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            sink.send(Message::Pong(data))
                                .await
                                .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(session_id = session_id, "WebSocket closed by client");
                            break;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(
                                session_id = session_id,
                                len = data.len(),
                                "Ignoring binary frame"
                            );
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(NetworkError::WebSocket(e.to_string()).into());
                        }
                    }
                }
                event = outbound_rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    trace!(session_id = session_id, event = event.name(), "Sending event");
                    let text = encode_event(&event)?;
                    sink.send(Message::Text(text))
                        .await
                        .map_err(|e| NetworkError::WebSocket(e.to_string()))?;
                }
                _ = shutdown_rx.recv() => {
                    debug!(session_id = session_id, "Closing connection for shutdown");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Route one text frame. Returns false once the client asked to leave.
    pub fn handle_text(&self, session_id: SessionId, text: &str) -> bool {
        match decode_command(text) {
            Ok(Command::Disconnect) => {
                self.state.dispatcher.handle(session_id, Command::Disconnect);
                false
            }
            Ok(command) => {
                self.state.dispatcher.handle(session_id, command);
                true
            }
            Err(e) => {
                warn!(session_id = session_id, error = %e, "Ignoring malformed frame");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, SpawnPoint};
    use crate::game::area::{Area, Layer};
    use crate::game::world::World;
    use tokio::sync::broadcast;

    fn test_state() -> Arc<AppState> {
        let config = ServerConfig {
            dev_mode: true,
            spawn: SpawnPoint {
                area_id: 1,
                x: 0,
                y: 0,
            },
            ..ServerConfig::default()
        };
        let area = Area::new(
            1,
            4,
            4,
            32,
            vec![Layer::new(4, 4, vec![0; 16])],
            Vec::new(),
            Vec::new(),
        );
        let world = World::from_areas(32, [area]);
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(AppState::new(config, world, shutdown_tx).unwrap())
    }

    #[tokio::test]
    async fn test_text_frames_reach_dispatcher() {
        let state = test_state();
        let handler = ConnectionHandler::new(state.clone());
        let (session, mut rx) = state
            .session_manager
            .create_session("127.0.0.1:4000".parse().unwrap())
            .unwrap();

        assert!(handler.handle_text(
            session.id,
            r#"{"header":"login","username":"alice","password":"pw"}"#
        ));
        assert_eq!(state.players_online(), 1);
        assert_eq!(
            rx.try_recv().ok(),
            Some(OutboundEvent::LoginAccepted { player_id: 1 })
        );

        assert!(!handler.handle_text(session.id, r#"{"header":"disconnect"}"#));
        assert_eq!(state.players_online(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_ignored() {
        let state = test_state();
        let handler = ConnectionHandler::new(state.clone());
        let (session, mut rx) = state
            .session_manager
            .create_session("127.0.0.1:4000".parse().unwrap())
            .unwrap();

        assert!(handler.handle_text(session.id, "{\"header\":\"fly\"}"));
        assert!(handler.handle_text(session.id, "garbage"));
        assert!(rx.try_recv().is_err());
        assert_eq!(state.players_online(), 0);
    }
}
