//! Client Runtime
//!
//! WebSocket connection to the relay plus the driver loop that owns a
//! [`ClientContext`] and a [`Scene`]. One task interleaves network arrivals,
//! the per-frame step and the outbound sample, so the context is never shared.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::{env_var, ConfigError};
use crate::core::vec3::Vec3;
use crate::game::context::{ClientConfig, ClientContext, Outcome};
use crate::game::input::InputIntents;
use crate::game::scene::Scene;
use crate::network::protocol::Message;

/// Highest accepted frame rate. Keeps the frame interval at 1 ms or more.
pub const MAX_FRAME_RATE: u32 = 1000;

/// Client runtime configuration.
#[derive(Debug, Clone)]
pub struct ClientRuntimeConfig {
    /// Relay WebSocket URL.
    pub server_url: String,
    /// Simulation frames per second.
    pub frame_rate: u32,
    /// Outbound and inbound queue length.
    pub channel_capacity: usize,
    /// Gameplay tunables.
    pub game: ClientConfig,
}

impl Default for ClientRuntimeConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            frame_rate: 60,
            channel_capacity: 100,
            game: ClientConfig::default(),
        }
    }
}

impl ClientRuntimeConfig {
    /// Defaults overlaid with `EMBERLANDS_SERVER_URL`, `EMBERLANDS_FRAME_RATE`
    /// and the gameplay variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            game: ClientConfig::from_env()?,
            ..Self::default()
        };
        if let Some(url) = env_var("EMBERLANDS_SERVER_URL")? {
            config.server_url = url;
        }
        if let Some(rate) = env_var::<u32>("EMBERLANDS_FRAME_RATE")? {
            config.frame_rate = rate.clamp(1, MAX_FRAME_RATE);
        }
        Ok(config)
    }

    /// Duration of one simulation frame, never shorter than 1 ms.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.clamp(1, MAX_FRAME_RATE)
    }
}

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not reach the relay.
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        /// Relay URL
        url: String,
        /// Underlying failure
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// WebSocket error on an open connection.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A message could not be encoded.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The connection task went away.
    #[error("Connection channel closed")]
    ChannelClosed,
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Channels to a live relay connection.
#[derive(Debug)]
pub struct Connection {
    /// Messages to send.
    pub outgoing: mpsc::Sender<Message>,
    /// Messages received, in arrival order.
    pub incoming: mpsc::Receiver<Message>,
}

/// Connect to the relay and spawn the reader and writer tasks.
pub async fn connect(url: &str, capacity: usize) -> Result<Connection, ClientError> {
    info!("Connecting to {}...", url);
    let (ws_stream, _) = connect_async(url).await.map_err(|source| ClientError::Connect {
        url: url.to_string(),
        source,
    })?;
    info!("WebSocket connected");

    let (mut write, mut read) = ws_stream.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(capacity);
    let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(capacity);

    // Reader task
    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match Message::from_json(&text) {
                    Ok(msg) => {
                        if incoming_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Dropping malformed message: {}", e);
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    info!("Relay closed connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        debug!("Reader task ended");
    });

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("{}", ClientError::Encode(e));
                    continue;
                }
            };
            if let Err(e) = write.send(WsMessage::Text(text)).await {
                error!("Failed to send message: {}", e);
                break;
            }
        }
        let _ = write.close().await;
        debug!("Writer task ended");
    });

    Ok(Connection {
        outgoing: outgoing_tx,
        incoming: incoming_rx,
    })
}

// =============================================================================
// DRIVER
// =============================================================================

/// Local inputs for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlFrame {
    /// Held intents.
    pub intents: InputIntents,
    /// Pose from the physics layer, if it moved.
    pub pose: Option<(Vec3, f32)>,
    /// Confirm the duel prompt.
    pub challenge: bool,
    /// Answer a pending invite: accept (true) or decline (false).
    pub answer_invite: Option<bool>,
}

/// Source of local input: a keyboard, a physics step, or a bot.
pub trait Controller {
    /// Inputs for the frame at `now`.
    fn poll(&mut self, context: &ClientContext, now: Instant) -> ControlFrame;
}

/// Owns the client context and pumps it until the connection closes.
pub struct ClientDriver<S: Scene, C: Controller> {
    context: ClientContext,
    scene: S,
    controller: C,
    frame_interval: Duration,
    sample_interval: Duration,
}

impl<S: Scene, C: Controller> ClientDriver<S, C> {
    /// Build a driver around a fresh context.
    pub fn new(config: &ClientRuntimeConfig, spawn: Vec3, scene: S, controller: C) -> Self {
        Self {
            context: ClientContext::new(config.game, spawn),
            scene,
            controller,
            frame_interval: config.frame_interval(),
            sample_interval: config.game.sync.send_interval,
        }
    }

    /// Client state.
    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Presentation layer.
    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Run until the relay closes the connection.
    pub async fn run(&mut self, connection: Connection) -> Result<(), ClientError> {
        let Connection { outgoing, mut incoming } = connection;

        let mut frames = interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut samples = interval(self.sample_interval);
        samples.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = incoming.recv() => {
                    let Some(msg) = msg else {
                        info!("Connection closed");
                        return Ok(());
                    };
                    let outcome = self.context.handle_message(msg, Instant::now());
                    self.apply(outcome, &outgoing).await?;
                }
                _ = frames.tick() => {
                    let outcome = self.step(Instant::now());
                    self.apply(outcome, &outgoing).await?;
                }
                _ = samples.tick() => {
                    if let Some(msg) = self.context.sample(Instant::now()) {
                        outgoing.send(msg).await.map_err(|_| ClientError::ChannelClosed)?;
                    }
                }
            }
        }
    }

    fn step(&mut self, now: Instant) -> Outcome {
        let control = self.controller.poll(&self.context, now);
        let mut outcome = Outcome::default();

        if let Some((position, rotation_y)) = control.pose {
            self.context.set_local_pose(position, rotation_y);
        }
        if control.challenge {
            outcome.extend(self.context.challenge(now));
        }
        match control.answer_invite {
            Some(true) => outcome.extend(self.context.accept_invite(now)),
            Some(false) => outcome.extend(self.context.decline_invite(now)),
            None => {}
        }
        outcome.extend(self.context.apply_intents(control.intents, now));
        outcome.extend(self.context.frame(now));
        outcome
    }

    async fn apply(&mut self, outcome: Outcome, outgoing: &mpsc::Sender<Message>) -> Result<(), ClientError> {
        for command in &outcome.scene {
            self.scene.apply(command);
        }
        for msg in outcome.outbound {
            if outgoing.send(msg).await.is_err() {
                warn!("Outgoing channel closed");
                return Err(ClientError::ChannelClosed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::scene::HeadlessScene;
    use crate::game::state::PlayerId;
    use crate::network::protocol::{InitInfo, PlayerUpdate};
    use crate::game::state::ActionState;

    struct Idle;

    impl Controller for Idle {
        fn poll(&mut self, _: &ClientContext, _: Instant) -> ControlFrame {
            ControlFrame::default()
        }
    }

    #[test]
    fn test_runtime_config_default() {
        let config = ClientRuntimeConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:8080");
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 60);
        assert_eq!(config.game.sync.send_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_frame_interval_bounded() {
        let fast = ClientRuntimeConfig { frame_rate: u32::MAX, ..Default::default() };
        assert_eq!(fast.frame_interval(), Duration::from_millis(1));
        let stopped = ClientRuntimeConfig { frame_rate: 0, ..Default::default() };
        assert_eq!(stopped.frame_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_driver_with_extreme_rate_ticks() {
        let config = ClientRuntimeConfig { frame_rate: u32::MAX, ..Default::default() };
        let mut driver = ClientDriver::new(&config, Vec3::ZERO, HeadlessScene::default(), Idle);

        let (out_tx, _out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);
        drop(in_tx);

        let result = driver.run(Connection { outgoing: out_tx, incoming: in_rx }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_driver_runs_until_closed() {
        let config = ClientRuntimeConfig::default();
        let mut driver = ClientDriver::new(&config, Vec3::ZERO, HeadlessScene::default(), Idle);

        let (out_tx, mut out_rx) = mpsc::channel(16);
        let (in_tx, in_rx) = mpsc::channel(16);

        in_tx.send(Message::Init(InitInfo { id: PlayerId::new("me") })).await.unwrap();
        in_tx
            .send(Message::PlayerUpdate(PlayerUpdate {
                id: PlayerId::new("p2"),
                position: Vec3::new(20.0, 0.0, 0.0),
                rotation_y: 0.0,
                state: ActionState::Walking,
            }))
            .await
            .unwrap();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            drop(in_tx);
        });

        driver
            .run(Connection { outgoing: out_tx, incoming: in_rx })
            .await
            .unwrap();
        closer.await.unwrap();

        assert_eq!(driver.context().id(), Some(&PlayerId::new("me")));
        assert!(driver.scene().participants.contains_key(&PlayerId::new("p2")));
        assert!(matches!(out_rx.try_recv(), Ok(Message::Move(_))));
    }
}
