pub mod protocol;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::broadcast::{Subscription, Topic};
use crate::interview::InterviewEngine;
use protocol::{execute, parse_envelope, salvage_request_id, Request, ServerMessage};

/// Frames queued per connection before events start being dropped.
const OUTBOUND_CAPACITY: usize = 256;

/// Websocket front door for the engine. One task per connection; each
/// topic subscription gets its own forwarding task.
pub struct Gateway {
    listener: TcpListener,
    engine: Arc<InterviewEngine>,
}

impl Gateway {
    pub async fn bind(address: &str, engine: Arc<InterviewEngine>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("🌐 Gateway listening on ws://{}", listener.local_addr()?);
        Ok(Self { listener, engine })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self) -> std::io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tokio::spawn(handle_connection(self.engine.clone(), stream, peer));
        }
    }
}

async fn handle_connection(engine: Arc<InterviewEngine>, stream: TcpStream, peer: SocketAddr) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Websocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    info!("🔌 Client connected: {}", peer);

    let (mut sink, mut reader) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode outbound frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut subscriptions: HashMap<Topic, JoinHandle<()>> = HashMap::new();

    while let Some(frame) = reader.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Websocket error from {}: {}", peer, e);
                break;
            }
        };

        let envelope = match parse_envelope(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Rejected frame from {}: {}", peer, e);
                if outbound.send(ServerMessage::error(salvage_request_id(&text), &e)).await.is_err() {
                    break;
                }
                continue;
            }
        };
        let request_id = envelope.request_id;

        let reply = match envelope.request {
            Request::Subscribe(target) => match engine.get_session(target.session_id).await {
                Ok(_) => {
                    let topic = target.topic();
                    subscriptions.entry(topic).or_insert_with(|| {
                        debug!("{} subscribed to {}", peer, topic);
                        forward(engine.subscribe(topic), outbound.clone(), peer)
                    });
                    ServerMessage::response(request_id, serde_json::json!({ "subscribed": topic.to_string() }))
                }
                Err(e) => ServerMessage::error(request_id, &e),
            },
            Request::Unsubscribe(target) => {
                let topic = target.topic();
                if let Some(task) = subscriptions.remove(&topic) {
                    task.abort();
                }
                ServerMessage::response(request_id, serde_json::json!({ "unsubscribed": topic.to_string() }))
            }
            request => match execute(&engine, request).await {
                Ok(data) => ServerMessage::response(request_id, data),
                Err(e) => ServerMessage::error(request_id, &e),
            },
        };

        if outbound.send(reply).await.is_err() {
            break;
        }
    }

    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    drop(outbound);
    let _ = writer.await;
    info!("👋 Client disconnected: {}", peer);
}

/// Events for a client that is not draining its queue are dropped, the
/// same way the hub skips messages for a lagging subscriber.
fn forward(mut subscription: Subscription, outbound: mpsc::Sender<ServerMessage>, peer: SocketAddr) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(published) = subscription.recv().await {
            match outbound.try_send(ServerMessage::event(&published)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue for {} is full, dropping event on {}", peer, published.topic);
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
    })
}
