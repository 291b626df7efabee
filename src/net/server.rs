//! TCP server
//!
//! One task per connection reads frames and drives the [`World`]; a second
//! task per connection drains that entity's outbound queue onto the socket, so
//! a slow peer only ever backs up its own queue.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::framing::{read_message, write_message, FramingError};
use crate::net::protocol::{decode, encode, ClientMessage, ServerMessage};
use crate::world::constants::net::MAX_CHAT_LEN;
use crate::world::entity::EntityId;
use crate::world::manager::World;
use crate::world::notify::{ChannelOutbound, Notification};

/// World server listening for game clients
pub struct GameServer {
    config: ServerConfig,
    world: Arc<World>,
    metrics: Arc<Metrics>,
}

impl GameServer {
    pub fn new(config: ServerConfig, world: Arc<World>, metrics: Arc<Metrics>) -> Self {
        Self { config, world, metrics }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Bind the configured address and serve forever
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        info!("World server listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;

            if self.metrics.connections_active.load(Ordering::Relaxed) as usize >= self.config.max_connections {
                self.metrics.connections_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Connection from {} rejected: at capacity ({})", peer, self.config.max_connections);
                drop(stream);
                continue;
            }

            // Reserve the slot before the task runs
            self.metrics.connections_active.fetch_add(1, Ordering::Relaxed);

            let world = self.world.clone();
            let metrics = self.metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, world, metrics.clone()).await {
                    warn!("Connection error ({}): {}", peer, e);
                }
                metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}

/// Drive one client connection from connect to disconnect
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    world: Arc<World>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();

    let (outbound, rx) = ChannelOutbound::new();
    let writer_task = spawn_writer(writer, rx, metrics.clone());

    let entity_id = match world.on_connect(Arc::new(outbound)).await {
        Ok(id) => id,
        Err(e) => {
            writer_task.abort();
            return Err(anyhow::anyhow!("Failed to register {}: {}", peer, e));
        }
    };
    info!("Connection {} bound to entity {}", peer, entity_id);

    loop {
        let frame = match read_message(&mut reader).await {
            Ok(frame) => frame,
            Err(FramingError::ConnectionClosed) => {
                debug!("Connection {} closed by peer", peer);
                break;
            }
            Err(e) => {
                warn!("Dropping connection {}: {}", peer, e);
                break;
            }
        };

        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        metrics.bytes_received.fetch_add(frame.len() as u64 + 4, Ordering::Relaxed);

        let message: ClientMessage = match decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed frame from entity {}: {}", entity_id, e);
                continue;
            }
        };

        handle_message(&world, entity_id, message).await;
    }

    if let Err(e) = world.on_disconnect(entity_id).await {
        warn!("Disconnect cleanup for entity {} failed: {}", entity_id, e);
    }
    writer_task.abort();
    Ok(())
}

/// Apply one client message. A failed operation is logged and does not end the session.
async fn handle_message(world: &World, entity_id: EntityId, message: ClientMessage) {
    let result = match message {
        ClientMessage::Move(position) => world.on_move(entity_id, position).await,
        ClientMessage::Chat { target, text } => {
            let text = clamp_chat(text);
            world.on_chat(entity_id, ClientMessage::chat_target(target), &text).await
        }
        ClientMessage::RequestSurroundings => world.on_request_surroundings(entity_id).await,
    };

    if let Err(e) = result {
        warn!("Operation for entity {} failed: {}", entity_id, e);
    }
}

/// Truncate chat text to the allowed length on a char boundary
fn clamp_chat(mut text: String) -> String {
    if text.len() > MAX_CHAT_LEN {
        let mut cut = MAX_CHAT_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Encode queued notifications onto the socket until the queue closes or a write fails
fn spawn_writer(
    mut writer: OwnedWriteHalf,
    mut rx: UnboundedReceiver<Notification>,
    metrics: Arc<Metrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let bytes = match encode(&ServerMessage::from(notification)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to encode notification: {}", e);
                    continue;
                }
            };
            if let Err(e) = write_message(&mut writer, &bytes).await {
                debug!("Writer stopped: {}", e);
                break;
            }
            metrics.bytes_sent.fetch_add(bytes.len() as u64 + 4, Ordering::Relaxed);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::world::aoi::AoiRegion;
    use crate::world::entity::{Position, SpawnConfig};
    use std::time::Duration;

    async fn start_server(max_connections: usize) -> (SocketAddr, Arc<World>, Arc<Metrics>) {
        let config = ServerConfig {
            max_connections,
            world: WorldConfig {
                region: AoiRegion::new(0, 300, 3, 0, 300, 3),
                spawn: SpawnConfig {
                    anchor_x: 50.0,
                    anchor_z: 50.0,
                    jitter_x: 0,
                    jitter_z: 0,
                },
                notify_pacing: None,
            },
            ..ServerConfig::default()
        };
        let metrics = Arc::new(Metrics::new());
        let world = Arc::new(World::new(&config.world, metrics.clone()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = GameServer::new(config, world.clone(), metrics.clone());
        tokio::spawn(server.serve(listener));
        (addr, world, metrics)
    }

    async fn recv(stream: &mut TcpStream) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(5), read_message(stream))
            .await
            .expect("timed out waiting for frame")
            .unwrap();
        decode(&frame).unwrap()
    }

    async fn send(stream: &mut TcpStream, message: &ClientMessage) {
        write_message(stream, &encode(message).unwrap()).await.unwrap();
    }

    #[test]
    fn test_clamp_chat() {
        assert_eq!(clamp_chat("short".to_string()), "short");

        let long = "é".repeat(MAX_CHAT_LEN);
        let clamped = clamp_chat(long);
        assert!(clamped.len() <= MAX_CHAT_LEN);
        assert!(clamped.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_connect_move_disconnect_over_tcp() {
        let (addr, world, _metrics) = start_server(16).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let id_a = match recv(&mut a).await {
            ServerMessage::IdentityAssigned { id } => id,
            other => panic!("expected identity, got {:?}", other),
        };
        assert!(matches!(recv(&mut a).await, ServerMessage::PositionSnapshot { id, .. } if id == id_a));
        assert_eq!(recv(&mut a).await, ServerMessage::BatchSnapshot { entities: Vec::new() });

        let mut b = TcpStream::connect(addr).await.unwrap();
        let id_b = match recv(&mut b).await {
            ServerMessage::IdentityAssigned { id } => id,
            other => panic!("expected identity, got {:?}", other),
        };
        assert!(matches!(recv(&mut b).await, ServerMessage::PositionSnapshot { .. }));
        assert!(matches!(recv(&mut b).await, ServerMessage::EnteredView { id, .. } if id == id_a));
        assert!(matches!(
            recv(&mut b).await,
            ServerMessage::BatchSnapshot { entities } if entities.len() == 1 && entities[0].id == id_a
        ));
        assert!(matches!(recv(&mut a).await, ServerMessage::EnteredView { id, .. } if id == id_b));

        // b walks to the far corner: a sees it leave
        send(&mut b, &ClientMessage::Move(Position::new(250.0, 0.0, 250.0, 0.0))).await;
        assert_eq!(recv(&mut a).await, ServerMessage::LeftView { id: id_b });

        drop(b);
        tokio::time::timeout(Duration::from_secs(5), async {
            while world.online_count() > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("entity b was never unregistered");
        assert!(world.registry().get(id_b).is_err());
    }

    #[tokio::test]
    async fn test_direct_chat_over_tcp() {
        let (addr, _world, _metrics) = start_server(16).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let id_a = match recv(&mut a).await {
            ServerMessage::IdentityAssigned { id } => id,
            other => panic!("expected identity, got {:?}", other),
        };
        recv(&mut a).await;
        recv(&mut a).await;

        let mut b = TcpStream::connect(addr).await.unwrap();
        let id_b = match recv(&mut b).await {
            ServerMessage::IdentityAssigned { id } => id,
            other => panic!("expected identity, got {:?}", other),
        };
        // position, entered(a), batch; then a hears entered(b)
        for _ in 0..3 {
            recv(&mut b).await;
        }
        recv(&mut a).await;

        send(
            &mut a,
            &ClientMessage::Chat {
                target: Some(id_b),
                text: "hi b".to_string(),
            },
        )
        .await;

        assert_eq!(
            recv(&mut b).await,
            ServerMessage::Chat {
                from: id_a,
                world: false,
                text: "hi b".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_connection_cap_rejects_extra_client() {
        let (addr, world, metrics) = start_server(1).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut a).await, ServerMessage::IdentityAssigned { .. }));

        let mut b = TcpStream::connect(addr).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), read_message(&mut b))
            .await
            .expect("rejected connection was never closed");
        assert!(result.is_err());

        assert_eq!(metrics.connections_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 1);
        assert_eq!(world.online_count(), 1);
    }
}
