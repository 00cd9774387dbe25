//! EmberLands Bot
//!
//! Headless client: wanders around its spawn point, challenges whoever it
//! meets, accepts every invite and brawls until the duel ends.

use std::time::Instant;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use emberlands::game::duel::DuelPhase;
use emberlands::game::input::InputIntents;
use emberlands::game::scene::HeadlessScene;
use emberlands::network::client::{connect, ClientDriver, ClientRuntimeConfig, ControlFrame, Controller};
use emberlands::{ClientContext, Vec3, VERSION};

/// Walking speed in units per second.
const WALK_SPEED: f32 = 2.5;

/// Radius of the idle wander circle.
const WANDER_RADIUS: f32 = 4.0;

/// Distance at which the bot stops closing in and starts swinging.
const SWING_DISTANCE: f32 = 1.5;

struct Brawler {
    home: Vec3,
    started: Instant,
    last_poll: Option<Instant>,
    swings: u32,
}

impl Brawler {
    fn new(home: Vec3) -> Self {
        Self {
            home,
            started: Instant::now(),
            last_poll: None,
            swings: 0,
        }
    }

    fn step_toward(position: Vec3, target: Vec3, max_step: f32) -> (Vec3, f32) {
        let delta = target - position;
        let distance = delta.length();
        let heading = delta.x.atan2(delta.z);
        if distance <= max_step || distance == 0.0 {
            return (target, heading);
        }
        (position + delta.scale(max_step / distance), heading)
    }
}

impl Controller for Brawler {
    fn poll(&mut self, context: &ClientContext, now: Instant) -> ControlFrame {
        let dt = self.last_poll.map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_poll = Some(now);
        let max_step = WALK_SPEED * dt;
        let here = context.local().position;

        let mut frame = ControlFrame::default();

        match context.duel().phase() {
            DuelPhase::Invited { .. } => {
                frame.answer_invite = Some(true);
            }
            DuelPhase::Active(session) => {
                let Some(me) = context.id() else {
                    return frame;
                };
                let Some(opponent) = context.sync().get(session.opponent_of(me)) else {
                    return frame;
                };
                let target = opponent.rendered_position;
                if here.distance(target) > SWING_DISTANCE {
                    frame.pose = Some(Self::step_toward(here, target, max_step));
                    frame.intents = frame.intents.with(InputIntents::FLAG_MOVE, true);
                } else {
                    // Alternate punches and kicks; the resolver handles cooldown.
                    self.swings = self.swings.wrapping_add(1);
                    let flag = if (self.swings / 120) % 2 == 0 {
                        InputIntents::FLAG_PUNCH
                    } else {
                        InputIntents::FLAG_KICK
                    };
                    frame.intents = frame.intents.with(flag, true);
                }
            }
            DuelPhase::Idle | DuelPhase::Requested { .. } => {
                frame.challenge = context.duel().prompt().is_some()
                    && matches!(context.duel().phase(), DuelPhase::Idle);

                let t = now.duration_since(self.started).as_secs_f32() * WALK_SPEED / WANDER_RADIUS;
                let target = self.home + Vec3::new(WANDER_RADIUS * t.cos(), 0.0, WANDER_RADIUS * t.sin());
                frame.pose = Some(Self::step_toward(here, target, max_step.max(0.01)));
                frame.intents = frame.intents.with(InputIntents::FLAG_MOVE, true);
            }
        }

        frame
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientRuntimeConfig::from_env().context("reading client configuration")?;
    info!("EmberLands Bot v{}", VERSION);

    let connection = connect(&config.server_url, config.channel_capacity)
        .await
        .context("connecting to relay")?;

    let home = Vec3::new(0.0, 1.0, 0.0);
    let mut driver = ClientDriver::new(&config, home, HeadlessScene::default(), Brawler::new(home));

    tokio::select! {
        result = driver.run(connection) => result.context("client stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, leaving"),
    }

    info!(
        "Saw {} participants, health {}",
        driver.scene().participants.len(),
        driver.context().local().health
    );
    Ok(())
}
