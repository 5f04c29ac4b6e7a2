use super::channel::Delivery;
use super::IngestionMultiplexer;
use crate::cab::CabUpdate;
use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Rejection frame sent back for a message that failed validation
#[derive(Debug, Serialize)]
struct ErrorFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    error: &'a str,
}

/// Per-connection counters, logged on close
#[derive(Debug, Default)]
struct ConnectionTally {
    accepted: u64,
    rejected: u64,
    dropped: u64,
}

/// Lifecycle of one agent's ingestion stream
pub(crate) struct ConnectionHandler {
    mux: Arc<IngestionMultiplexer>,
    tally: ConnectionTally,
}

enum FrameOutcome {
    Continue,
    Close,
}

impl ConnectionHandler {
    pub(crate) fn new(mux: Arc<IngestionMultiplexer>) -> Self {
        Self {
            mux,
            tally: ConnectionTally::default(),
        }
    }

    /// Read frames until the peer leaves, the transport fails or the
    /// multiplexer shuts down
    pub(crate) async fn handle(mut self, mut socket: WebSocket, peer: String) {
        let connection_id = self.mux.registry().register(peer.clone());
        let mut shutdown = self.mux.shutdown_signal();

        info!(connection_id = %connection_id, peer = %peer, "Ingestion stream opened");

        let already_closing = *shutdown.borrow_and_update();
        if already_closing {
            let _ = socket.send(Message::Close(None)).await;
        }

        while !already_closing {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(msg) = msg else {
                        debug!(connection_id = %connection_id, "Ingestion stream ended");
                        break;
                    };
                    let outcome = match msg {
                        Ok(Message::Text(text)) => {
                            self.handle_frame(&mut socket, text.as_bytes()).await
                        }
                        Ok(Message::Binary(data)) => {
                            self.handle_frame(&mut socket, &data).await
                        }
                        // tungstenite queues the pong reply itself
                        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => FrameOutcome::Continue,
                        Ok(Message::Close(_)) => {
                            debug!(connection_id = %connection_id, "Client sent close frame");
                            FrameOutcome::Close
                        }
                        Err(e) => {
                            warn!(connection_id = %connection_id, error = %e, "Ingestion stream read failed");
                            FrameOutcome::Close
                        }
                    };
                    if let FrameOutcome::Close = outcome {
                        break;
                    }
                }

                _ = shutdown.changed() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        self.mux.registry().deregister(&connection_id);
        info!(
            connection_id = %connection_id,
            peer = %peer,
            accepted = self.tally.accepted,
            rejected = self.tally.rejected,
            dropped = self.tally.dropped,
            "Ingestion stream closed"
        );
    }

    /// Decode one update and hand it to the merge pipeline.
    ///
    /// Invalid input is answered with an error frame; the stream stays open.
    async fn handle_frame(&mut self, socket: &mut WebSocket, bytes: &[u8]) -> FrameOutcome {
        let update = match CabUpdate::parse(bytes) {
            Ok(update) => update,
            Err(e) => {
                self.tally.rejected += 1;
                warn!(error = %e, "Rejected cab update");
                return self.send_error(socket, &e.to_string()).await;
            }
        };

        let cab_id = update.id.clone();
        match self.mux.router().deliver(update).await {
            Ok(Delivery::Queued) => {
                self.tally.accepted += 1;
                debug!(cab_id = %cab_id, "Cab update queued");
                FrameOutcome::Continue
            }
            Ok(Delivery::Dropped) => {
                self.tally.dropped += 1;
                FrameOutcome::Continue
            }
            Err(e) => {
                error!(cab_id = %cab_id, error = %e, "Cannot queue cab update");
                FrameOutcome::Close
            }
        }
    }

    async fn send_error(&self, socket: &mut WebSocket, message: &str) -> FrameOutcome {
        let frame = ErrorFrame {
            kind: "error",
            error: message,
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to encode error frame");
                return FrameOutcome::Continue;
            }
        };
        if let Err(e) = socket.send(Message::Text(json)).await {
            warn!(error = %e, "Failed to send error frame");
            return FrameOutcome::Close;
        }
        FrameOutcome::Continue
    }
}
