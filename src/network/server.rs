//! WebSocket Relay Server
//!
//! Accepts WebSocket connections, issues each an identifier and relays client
//! messages to the other participants. The relay holds no game state: it
//! re-labels `move` samples with their sender and passes every other client
//! kind through unchanged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{env_var, ConfigError};
use crate::game::state::PlayerId;
use crate::network::protocol::{DisconnectInfo, InitInfo, Message, PlayerUpdate};
use crate::network::session::SessionRegistry;

/// How long a lagging peer's full queue gets to take a `disconnect`.
pub const DISCONNECT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-session outbound queue length.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            channel_capacity: 64,
        }
    }
}

impl RelayConfig {
    /// Defaults overlaid with `EMBERLANDS_BIND_ADDR`,
    /// `EMBERLANDS_MAX_CONNECTIONS` and `EMBERLANDS_CHANNEL_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = env_var("EMBERLANDS_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = env_var("EMBERLANDS_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(capacity) = env_var::<usize>("EMBERLANDS_CHANNEL_CAPACITY")? {
            config.channel_capacity = capacity.max(1);
        }
        Ok(config)
    }
}

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

// =============================================================================
// ROUTING
// =============================================================================

/// Where a client message goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// To every session except the sender.
    Broadcast(Message),
    /// Nowhere.
    Drop,
}

/// Decide where a message from `sender` goes.
pub fn route(sender: &PlayerId, message: Message) -> Route {
    match message {
        Message::Move(update) => {
            Route::Broadcast(Message::PlayerUpdate(PlayerUpdate::from_move(sender.clone(), update)))
        }

        msg @ (Message::DuelRequest(_)
        | Message::DuelInvite(_)
        | Message::DuelAccepted(_)
        | Message::DuelEnd(_)
        | Message::HealthUpdate(_)
        | Message::ApplyDamage(_)) => Route::Broadcast(msg),

        Message::Init(_) | Message::PlayerUpdate(_) | Message::Disconnect(_) => Route::Drop,
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// The relay server.
pub struct RelayServer {
    /// Server configuration.
    config: RelayConfig,
    /// Open sessions.
    sessions: Arc<SessionRegistry>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            shutdown_tx,
        }
    }

    /// Bind and serve until [`Self::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if let Err(e) = self.admit().await {
                                warn!("{}, rejecting {}", e, addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn admit(&self) -> Result<(), RelayError> {
        if self.sessions.session_count().await >= self.config.max_connections {
            return Err(RelayError::ConnectionLimitReached);
        }
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let sessions = self.sessions.clone();
        let capacity = self.config.channel_capacity;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(capacity);

            let id = sessions.register(msg_tx.clone()).await;
            info!("Participant {} connected from {}", id.short(), addr);

            // Nothing else can be queued before this: the id was just issued.
            if msg_tx.try_send(Message::Init(InitInfo { id: id.clone() })).is_err() {
                warn!("Could not queue init for {}", id.short());
            }
            drop(msg_tx);

            // Writer task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(WsMessage::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                let msg = match Message::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Dropping malformed message from {}: {}", id.short(), e);
                                        continue;
                                    }
                                };
                                Self::dispatch(&sessions, &id, msg).await;
                            }
                            Some(Ok(WsMessage::Binary(_))) => {
                                debug!("Ignoring binary frame from {}", id.short());
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                debug!("Participant {} closed", id.short());
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", id.short(), e);
                                break;
                            }
                            // Ping/Pong are answered by tungstenite.
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            Self::disconnect(&sessions, &id).await;
            // Dropping the registry's sender ends the writer once it drains.
            if let Err(e) = sender_task.await {
                debug!("Writer task for {} ended abnormally: {}", id.short(), e);
            }
        });
    }

    /// Route one parsed client message.
    async fn dispatch(sessions: &SessionRegistry, sender: &PlayerId, msg: Message) {
        let kind = msg.kind();
        match route(sender, msg) {
            Route::Broadcast(out) => {
                let delivered = sessions.broadcast_except(sender, &out).await;
                debug!("{} from {} relayed to {}", kind, sender.short(), delivered);
            }
            Route::Drop => {
                debug!("Dropping server-only {} from {}", kind, sender.short());
            }
        }
    }

    /// Tear a session down and tell everyone else, once.
    async fn disconnect(sessions: &SessionRegistry, id: &PlayerId) {
        if sessions.unregister(id).await {
            let bye = Message::Disconnect(DisconnectInfo { id: id.clone() });
            let delivered = sessions.broadcast_except_within(id, &bye, DISCONNECT_DELIVERY_TIMEOUT).await;
            info!("Participant {} disconnected, {} notified", id.short(), delivered);
        }
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open connection count.
    pub async fn connection_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;
    use crate::game::combat::AttackKind;
    use crate::game::state::ActionState;
    use crate::network::protocol::{
        ApplyDamage, DuelAccepted, DuelEnd, DuelInvite, DuelRequest, HealthUpdate, MoveUpdate,
    };

    fn id(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn test_move_becomes_player_update() {
        let msg = Message::Move(MoveUpdate {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation_y: 0.25,
            state: ActionState::Walking,
        });
        assert_eq!(
            route(&id("p1"), msg),
            Route::Broadcast(Message::PlayerUpdate(PlayerUpdate {
                id: id("p1"),
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation_y: 0.25,
                state: ActionState::Walking,
            }))
        );
    }

    #[test]
    fn test_duel_request_forwarded_verbatim() {
        let msg = Message::DuelRequest(DuelRequest { from: id("p1"), to: id("p2") });
        assert_eq!(route(&id("p1"), msg.clone()), Route::Broadcast(msg));
    }

    #[test]
    fn test_client_kinds_pass_through() {
        let msgs = vec![
            Message::DuelInvite(DuelInvite { from: id("p1") }),
            Message::DuelAccepted(DuelAccepted { from: id("p2"), to: id("p1") }),
            Message::DuelEnd(DuelEnd { loser_id: id("p1"), winner_id: id("p2") }),
            Message::HealthUpdate(HealthUpdate { id: id("p1"), health: 80 }),
            Message::ApplyDamage(ApplyDamage {
                to: id("p2"),
                damage: 15,
                from: Some(id("p1")),
                attack: Some(AttackKind::Kick),
            }),
        ];
        for msg in msgs {
            assert_eq!(route(&id("p1"), msg.clone()), Route::Broadcast(msg));
        }
    }

    #[test]
    fn test_server_only_kinds_dropped() {
        let msgs = vec![
            Message::Init(InitInfo { id: id("p9") }),
            Message::Disconnect(DisconnectInfo { id: id("p2") }),
            Message::PlayerUpdate(PlayerUpdate {
                id: id("p2"),
                position: Vec3::ZERO,
                rotation_y: 0.0,
                state: ActionState::Idle,
            }),
        ];
        for msg in msgs {
            assert!(msg.is_server_only());
            assert_eq!(route(&id("p1"), msg), Route::Drop);
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = RelayConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = RelayServer::new(config);
        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_announced_once() {
        let sessions = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = sessions.register(tx_a).await;
        sessions.register(tx_b).await;

        RelayServer::disconnect(&sessions, &a).await;
        RelayServer::disconnect(&sessions, &a).await;

        assert_eq!(rx_b.try_recv().unwrap(), Message::Disconnect(DisconnectInfo { id: a }));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(sessions.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_waits_for_lagging_peer() {
        let sessions = SessionRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(1);
        let a = sessions.register(tx_a).await;
        sessions.register(tx_b.clone()).await;
        tx_b.try_send(Message::Init(InitInfo { id: id("backlog") })).unwrap();

        let reader = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut seen = Vec::new();
            while seen.len() < 2 {
                match rx_b.recv().await {
                    Some(msg) => seen.push(msg),
                    None => break,
                }
            }
            seen
        });

        RelayServer::disconnect(&sessions, &a).await;

        let seen = reader.await.unwrap();
        assert_eq!(seen.last(), Some(&Message::Disconnect(DisconnectInfo { id: a })));
    }

    #[tokio::test]
    async fn test_dispatch_move_reaches_others_only() {
        let sessions = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = sessions.register(tx_a).await;
        sessions.register(tx_b).await;

        let mv = Message::Move(MoveUpdate {
            position: Vec3::new(4.0, 0.0, 0.0),
            rotation_y: 0.0,
            state: ActionState::Idle,
        });
        RelayServer::dispatch(&sessions, &a, mv).await;

        match rx_b.try_recv().unwrap() {
            Message::PlayerUpdate(update) => assert_eq!(update.id, a),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_over_websocket() {
        let server = Arc::new(RelayServer::new(RelayConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        let wait = Duration::from_secs(2);

        // A speaks raw frames so it can send text that is not a message.
        let (mut ws_a, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let first = tokio::time::timeout(wait, ws_a.next()).await.unwrap().unwrap().unwrap();
        let a = match Message::from_json(first.to_text().unwrap()).unwrap() {
            Message::Init(info) => info.id,
            other => panic!("expected init, got {:?}", other),
        };

        let mut b = crate::network::client::connect(&url, 16).await.unwrap();
        match tokio::time::timeout(wait, b.incoming.recv()).await.unwrap() {
            Some(Message::Init(info)) => assert_ne!(info.id, a),
            other => panic!("expected init, got {:?}", other),
        }

        ws_a.send(WsMessage::Text("not json".into())).await.unwrap();
        let mv = Message::Move(MoveUpdate {
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation_y: 0.5,
            state: ActionState::Walking,
        });
        ws_a.send(WsMessage::Text(mv.to_json().unwrap())).await.unwrap();

        match tokio::time::timeout(wait, b.incoming.recv()).await.unwrap() {
            Some(Message::PlayerUpdate(update)) => {
                assert_eq!(update.id, a);
                assert_eq!(update.position, Vec3::new(1.0, 0.0, 2.0));
            }
            other => panic!("expected playerUpdate, got {:?}", other),
        }

        // Neither the malformed frame nor A's own move comes back to A.
        let echo = tokio::time::timeout(Duration::from_millis(200), ws_a.next()).await;
        assert!(echo.is_err());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let config = RelayConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Arc::new(RelayServer::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        // The signal only reaches a loop that has already subscribed.
        for _ in 0..50 {
            server.shutdown();
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
