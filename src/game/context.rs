//! Client Context
//!
//! Everything a client knows about the world, held in one place and passed
//! explicitly: the local participant, remote replicas, duel negotiation and
//! combat state. Network arrivals, input intents and frame ticks all come in
//! through `&mut self`, strictly interleaved, so no locking is involved.
//!
//! Every entry point returns an [`Outcome`]: messages for the relay and
//! commands for the scene layer.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{env_var, ConfigError};
use crate::core::vec3::Vec3;
use crate::game::combat::{
    AttackOutcome, ClientAuthority, CombatResolver, DamageOutcome, ATTACK_COOLDOWN, ATTACK_RANGE,
    HIT_REACTION_LOCK,
};
use crate::game::duel::{
    DuelEffect, DuelEvent, DuelState, ARENA_RADIUS, ARENA_SPAWN_OFFSET, PROXIMITY_THRESHOLD,
};
use crate::game::input::InputIntents;
use crate::game::scene::SceneCommand;
use crate::game::state::{ActionState, PlayerId, PlayerState};
use crate::game::sync::{ReplicaChange, StateSynchronizer, SyncConfig};
use crate::network::protocol::Message;

/// How long victory/defeat animations hold the local participant.
pub const OUTCOME_LOCK: Duration = Duration::from_millis(2000);

/// Gameplay tunables for a client.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Outbound cadence and smoothing.
    pub sync: SyncConfig,
    /// Challenge distance.
    pub proximity_threshold: f32,
    /// Attack distance (exclusive).
    pub attack_range: f32,
    /// Time between resolved attacks.
    pub attack_cooldown: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            proximity_threshold: PROXIMITY_THRESHOLD,
            attack_range: ATTACK_RANGE,
            attack_cooldown: ATTACK_COOLDOWN,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `EMBERLANDS_SEND_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = env_var::<u64>("EMBERLANDS_SEND_INTERVAL_MS")? {
            config.sync.send_interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}

/// Result of feeding something into the context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Messages to send to the relay, in order.
    pub outbound: Vec<Message>,
    /// Commands for the scene layer, in order.
    pub scene: Vec<SceneCommand>,
}

impl Outcome {
    /// True if nothing needs doing.
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.scene.is_empty()
    }

    /// Append another outcome.
    pub fn extend(&mut self, other: Outcome) {
        self.outbound.extend(other.outbound);
        self.scene.extend(other.scene);
    }
}

/// Client-side world state.
#[derive(Debug)]
pub struct ClientContext {
    config: ClientConfig,
    id: Option<PlayerId>,
    local: PlayerState,
    sync: StateSynchronizer,
    duel: DuelState,
    combat: CombatResolver,
    intents: InputIntents,
}

impl ClientContext {
    /// New context; the local participant exists before the relay names it.
    pub fn new(config: ClientConfig, spawn: Vec3) -> Self {
        let combat = CombatResolver::new(
            Box::new(ClientAuthority { attack_range: config.attack_range }),
            config.attack_cooldown,
        );
        Self {
            config,
            id: None,
            local: PlayerState::new(PlayerId::new(""), spawn),
            sync: StateSynchronizer::new(config.sync),
            duel: DuelState::new(),
            combat,
            intents: InputIntents::none(),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Identifier issued by the relay, once `init` arrived.
    pub fn id(&self) -> Option<&PlayerId> {
        self.id.as_ref()
    }

    /// Local participant (ground truth).
    pub fn local(&self) -> &PlayerState {
        &self.local
    }

    /// Remote replicas.
    pub fn sync(&self) -> &StateSynchronizer {
        &self.sync
    }

    /// Duel negotiation state.
    pub fn duel(&self) -> &DuelState {
        &self.duel
    }

    /// Combat state.
    pub fn combat(&self) -> &CombatResolver {
        &self.combat
    }

    // -------------------------------------------------------------------------
    // Local inputs
    // -------------------------------------------------------------------------

    /// Pose reported by the physics layer.
    pub fn set_local_pose(&mut self, position: Vec3, rotation_y: f32) {
        if position.is_finite() {
            self.local.position = position;
        }
        if rotation_y.is_finite() {
            self.local.rotation_y = rotation_y;
        }
    }

    /// Held-key intents for this frame.
    pub fn apply_intents(&mut self, intents: InputIntents, now: Instant) -> Outcome {
        self.intents = intents;
        let mut out = Outcome::default();
        self.update_action(now, &mut out);
        out
    }

    /// Confirm the duel prompt.
    pub fn challenge(&mut self, now: Instant) -> Outcome {
        self.duel_event(DuelEvent::Challenge, now)
    }

    /// Accept the pending invite.
    pub fn accept_invite(&mut self, now: Instant) -> Outcome {
        self.duel_event(DuelEvent::Accept, now)
    }

    /// Decline the pending invite. The inviter is not told.
    pub fn decline_invite(&mut self, now: Instant) -> Outcome {
        self.duel_event(DuelEvent::Decline, now)
    }

    // -------------------------------------------------------------------------
    // Ticks
    // -------------------------------------------------------------------------

    /// Outbound state sample, once per send interval after `init`.
    pub fn sample(&mut self, now: Instant) -> Option<Message> {
        self.id.as_ref()?;
        self.sync.sample(now, &self.local)
    }

    /// One simulated frame: smooth replicas, advance attacks, re-evaluate
    /// duel proximity.
    pub fn frame(&mut self, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        self.sync.step();
        self.update_action(now, &mut out);

        if self.id.is_some() {
            let nearby = self.sync.within(self.local.position, self.config.proximity_threshold);
            out.extend(self.duel_event(DuelEvent::ProximityScan { nearby }, now));
        }
        out
    }

    // -------------------------------------------------------------------------
    // Network
    // -------------------------------------------------------------------------

    /// Apply a message from the relay.
    pub fn handle_message(&mut self, msg: Message, now: Instant) -> Outcome {
        let mut out = Outcome::default();

        match msg {
            Message::Init(info) => {
                info!("Assigned id {}", info.id);
                self.local.id = info.id.clone();
                self.id = Some(info.id);
            }

            Message::PlayerUpdate(update) => {
                if self.is_me(&update.id) {
                    return out;
                }
                let previous = self.sync.get(&update.id).map(|r| r.action_state);
                match self.sync.apply_update(&update) {
                    ReplicaChange::Created => {
                        debug!("New participant {}", update.id.short());
                        out.scene.push(SceneCommand::SpawnParticipant {
                            id: update.id.clone(),
                            position: update.position,
                        });
                    }
                    ReplicaChange::Updated => {}
                }
                if previous != Some(update.state) {
                    out.scene.push(SceneCommand::PlayAction {
                        id: update.id,
                        action: update.state,
                        lock: None,
                    });
                }
            }

            Message::Disconnect(info) => {
                if self.sync.remove(&info.id).is_some() {
                    debug!("Participant {} left", info.id.short());
                    out.scene.push(SceneCommand::DespawnParticipant { id: info.id.clone() });
                }
                out.extend(self.duel_event(DuelEvent::PeerDisconnected { id: info.id }, now));
            }

            Message::DuelInvite(invite) => {
                out.extend(self.duel_event(DuelEvent::InviteReceived { from: invite.from }, now));
            }

            Message::DuelRequest(request) => {
                // Requests reach everyone; only the addressee treats one as an invite.
                if self.is_me(&request.to) {
                    out.extend(self.duel_event(DuelEvent::InviteReceived { from: request.from }, now));
                }
            }

            Message::DuelAccepted(accepted) => {
                out.extend(self.duel_event(
                    DuelEvent::AcceptedReceived { from: accepted.from, to: accepted.to },
                    now,
                ));
            }

            Message::DuelEnd(end) => {
                out.extend(self.duel_event(
                    DuelEvent::EndReceived { loser: end.loser_id, winner: end.winner_id },
                    now,
                ));
            }

            Message::HealthUpdate(update) => {
                // Only the owner writes its health; our own echo carries nothing new.
                if !self.is_me(&update.id) && !self.sync.set_health(&update.id, update.health) {
                    debug!("Health for unknown participant {}", update.id.short());
                }
            }

            Message::ApplyDamage(damage) => {
                if self.is_me(&damage.to) && self.accepts_damage_from(damage.from.as_ref()) {
                    self.take_damage(damage.damage, now, &mut out);
                }
            }

            Message::Move(_) => {
                debug!("Ignoring raw move from relay");
            }
        }

        out
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn is_me(&self, id: &PlayerId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// Damage only counts inside a duel, and only from the opponent when the
    /// attacker names itself.
    fn accepts_damage_from(&self, from: Option<&PlayerId>) -> bool {
        let (Some(session), Some(me)) = (self.duel.active_session(), self.id.as_ref()) else {
            return false;
        };
        match from {
            Some(attacker) => session.opponent_of(me) == attacker,
            None => true,
        }
    }

    fn take_damage(&mut self, amount: u8, now: Instant, out: &mut Outcome) {
        match self.combat.take_damage(&mut self.local, amount, now) {
            DamageOutcome::Blocked => {
                debug!("Blocked {} damage", amount);
            }
            DamageOutcome::Hit { health, update } => {
                debug!("Took {} damage, health {}", amount, health);
                out.outbound.push(update);
                out.scene.push(SceneCommand::PlayAction {
                    id: self.local.id.clone(),
                    action: ActionState::TakingHit,
                    lock: Some(HIT_REACTION_LOCK),
                });
            }
            DamageOutcome::Defeated { update } => {
                info!("Defeated");
                out.outbound.push(update);
                out.extend(self.duel_event(DuelEvent::LocalDefeated, now));
            }
        }
    }

    fn update_action(&mut self, now: Instant, out: &mut Outcome) {
        if self.combat.is_locked(now) {
            return;
        }

        let intents = self.intents;
        if let Some(kind) = self.combat.poll_windup(now, |k| intents.attack_held(k)) {
            let opponent = self.opponent_state();
            match self.combat.attempt_attack(now, &self.local, opponent.as_ref(), kind) {
                AttackOutcome::Hit(msg) => {
                    debug!("{:?} landed", kind);
                    out.outbound.push(msg);
                }
                AttackOutcome::Missed => debug!("{:?} missed", kind),
                AttackOutcome::Ignored => {}
            }
        }

        let next = if let Some(pending) = self.combat.pending_attack() {
            pending.action_state()
        } else if intents.blocking() {
            ActionState::Blocking
        } else if let Some(kind) = intents.attack().filter(|k| self.combat.begin_attack(*k, now)) {
            out.scene.push(SceneCommand::PlayAction {
                id: self.local.id.clone(),
                action: kind.action_state(),
                lock: Some(kind.windup()),
            });
            kind.action_state()
        } else if intents.jumping() {
            ActionState::Jump
        } else if intents.moving() {
            ActionState::Walking
        } else {
            ActionState::Idle
        };

        if next != self.local.action_state {
            self.local.action_state = next;
        }
    }

    fn opponent_state(&self) -> Option<PlayerState> {
        let me = self.id.as_ref()?;
        let session = self.duel.active_session()?;
        self.sync
            .get(session.opponent_of(me))
            .map(|replica| replica.to_player_state())
    }

    fn position_of(&self, id: &PlayerId) -> Vec3 {
        if self.is_me(id) {
            self.local.position
        } else {
            self.sync
                .get(id)
                .map(|r| r.rendered_position)
                .unwrap_or(self.local.position)
        }
    }

    fn duel_event(&mut self, event: DuelEvent, now: Instant) -> Outcome {
        let mut out = Outcome::default();
        let Some(me) = self.id.clone() else {
            return out;
        };

        for effect in self.duel.step(&me, event) {
            match effect {
                DuelEffect::Send(msg) => out.outbound.push(msg),
                DuelEffect::ShowPrompt(id) => out.scene.push(SceneCommand::DuelPrompt(Some(id))),
                DuelEffect::HidePrompt => out.scene.push(SceneCommand::DuelPrompt(None)),
                DuelEffect::ShowInvite(id) => out.scene.push(SceneCommand::DuelInvite(Some(id))),
                DuelEffect::HideInvite => out.scene.push(SceneCommand::DuelInvite(None)),

                DuelEffect::SpawnArena { arena, participant_a, participant_b } => {
                    let opponent = if participant_a == me { &participant_b } else { &participant_a };
                    let center = self.position_of(&participant_a).midpoint(self.position_of(&participant_b));
                    let side = if me < *opponent { -1.0 } else { 1.0 };
                    let spawn = center + Vec3::new(side * ARENA_SPAWN_OFFSET, 2.0, 0.0);

                    info!("Duel with {} started", opponent.short());
                    self.combat.reset();
                    self.local.position = spawn;
                    out.scene.push(SceneCommand::CreateArena { arena, center, radius: ARENA_RADIUS });
                    out.scene.push(SceneCommand::TeleportLocal { position: spawn });
                }

                DuelEffect::DestroyArena(arena) => {
                    out.scene.push(SceneCommand::DestroyArena { arena });
                }

                DuelEffect::ResetHealth => {
                    info!("Duel over");
                    self.local.reset_health();
                    self.sync.reset_health();
                }

                DuelEffect::PlayOutcome(action) => {
                    self.combat.reset();
                    self.combat.lock_for(now, OUTCOME_LOCK);
                    self.local.action_state = action;
                    out.scene.push(SceneCommand::PlayAction {
                        id: me.clone(),
                        action,
                        lock: Some(OUTCOME_LOCK),
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::duel::DuelPhase;
    use crate::game::state::MAX_HEALTH;
    use crate::network::protocol::{
        ApplyDamage, DisconnectInfo, DuelInvite, HealthUpdate, InitInfo, PlayerUpdate,
    };

    fn id(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    fn context(me: &str) -> ClientContext {
        let mut ctx = ClientContext::new(ClientConfig::default(), Vec3::ZERO);
        ctx.handle_message(Message::Init(InitInfo { id: id(me) }), Instant::now());
        ctx
    }

    fn seen_at(ctx: &mut ClientContext, who: &str, x: f32) -> Outcome {
        ctx.handle_message(
            Message::PlayerUpdate(PlayerUpdate {
                id: id(who),
                position: Vec3::new(x, 0.0, 0.0),
                rotation_y: 0.0,
                state: ActionState::Idle,
            }),
            Instant::now(),
        )
    }

    fn dueling(me: &str, opponent: &str) -> ClientContext {
        let mut ctx = context(me);
        seen_at(&mut ctx, opponent, 1.0);
        let now = Instant::now();
        ctx.handle_message(Message::DuelInvite(DuelInvite { from: id(opponent) }), now);
        ctx.accept_invite(now);
        assert!(ctx.duel().is_active());
        ctx
    }

    #[test]
    fn test_no_sample_before_init() {
        let mut ctx = ClientContext::new(ClientConfig::default(), Vec3::ZERO);
        assert!(ctx.sample(Instant::now()).is_none());

        ctx.handle_message(Message::Init(InitInfo { id: id("me") }), Instant::now());
        assert!(matches!(ctx.sample(Instant::now()), Some(Message::Move(_))));
        assert_eq!(ctx.local().id, id("me"));
    }

    #[test]
    fn test_first_update_spawns_participant() {
        let mut ctx = context("me");
        let out = seen_at(&mut ctx, "p2", 4.0);
        assert_eq!(out.scene[0], SceneCommand::SpawnParticipant {
            id: id("p2"),
            position: Vec3::new(4.0, 0.0, 0.0),
        });

        let out = seen_at(&mut ctx, "p2", 5.0);
        assert!(out.is_empty());
        assert_eq!(ctx.sync().len(), 1);
    }

    #[test]
    fn test_own_update_ignored() {
        let mut ctx = context("me");
        assert!(seen_at(&mut ctx, "me", 4.0).is_empty());
        assert!(ctx.sync().is_empty());
    }

    #[test]
    fn test_disconnect_despawns_once() {
        let mut ctx = context("me");
        seen_at(&mut ctx, "p2", 4.0);

        let bye = Message::Disconnect(DisconnectInfo { id: id("p2") });
        let out = ctx.handle_message(bye.clone(), Instant::now());
        assert!(out.scene.contains(&SceneCommand::DespawnParticipant { id: id("p2") }));

        let out = ctx.handle_message(bye, Instant::now());
        assert!(out.is_empty());
    }

    #[test]
    fn test_frame_shows_prompt_for_single_neighbour() {
        let mut ctx = context("me");
        seen_at(&mut ctx, "p2", 3.0);
        let out = ctx.frame(Instant::now());
        assert!(out.scene.contains(&SceneCommand::DuelPrompt(Some(id("p2")))));

        let out = ctx.challenge(Instant::now());
        assert!(matches!(out.outbound[0], Message::DuelRequest(_)));
        assert_eq!(ctx.duel().phase(), &DuelPhase::Requested { opponent: id("p2") });
    }

    #[test]
    fn test_accept_builds_arena_and_teleports() {
        let ctx = dueling("me", "p2");
        // "me" sorts before "p2", so the local participant takes the negative side.
        assert_eq!(ctx.local().position, Vec3::new(0.5 - ARENA_SPAWN_OFFSET, 2.0, 0.0));
    }

    #[test]
    fn test_damage_outside_duel_ignored() {
        let mut ctx = context("me");
        let out = ctx.handle_message(
            Message::ApplyDamage(ApplyDamage { to: id("me"), damage: 10, from: None, attack: None }),
            Instant::now(),
        );
        assert!(out.is_empty());
        assert_eq!(ctx.local().health, MAX_HEALTH);
    }

    #[test]
    fn test_damage_from_bystander_ignored() {
        let mut ctx = dueling("me", "p2");
        ctx.handle_message(
            Message::ApplyDamage(ApplyDamage { to: id("me"), damage: 10, from: Some(id("p9")), attack: None }),
            Instant::now(),
        );
        assert_eq!(ctx.local().health, MAX_HEALTH);
    }

    #[test]
    fn test_damage_broadcasts_health() {
        let mut ctx = dueling("me", "p2");
        let out = ctx.handle_message(
            Message::ApplyDamage(ApplyDamage { to: id("me"), damage: 10, from: Some(id("p2")), attack: None }),
            Instant::now(),
        );
        assert_eq!(out.outbound, vec![Message::HealthUpdate(HealthUpdate { id: id("me"), health: 90 })]);
        assert_eq!(ctx.local().action_state, ActionState::TakingHit);
    }

    #[test]
    fn test_block_intent_suppresses_damage() {
        let mut ctx = dueling("me", "p2");
        let now = Instant::now() + OUTCOME_LOCK;
        ctx.apply_intents(InputIntents::from_flags(InputIntents::FLAG_BLOCK), now);
        assert_eq!(ctx.local().action_state, ActionState::Blocking);

        let out = ctx.handle_message(
            Message::ApplyDamage(ApplyDamage { to: id("me"), damage: 20, from: None, attack: None }),
            now,
        );
        assert!(out.outbound.is_empty());
        assert_eq!(ctx.local().health, MAX_HEALTH);
    }

    #[test]
    fn test_held_punch_lands_after_windup() {
        let mut ctx = dueling("me", "p2");
        // Stand next to the opponent replica.
        ctx.set_local_pose(Vec3::new(1.5, 0.0, 0.0), 0.0);

        let t0 = Instant::now();
        let punch = InputIntents::from_flags(InputIntents::FLAG_PUNCH);
        let out = ctx.apply_intents(punch, t0);
        assert!(out.outbound.is_empty());
        assert_eq!(ctx.local().action_state, ActionState::Punching);

        let out = ctx.apply_intents(punch, t0 + Duration::from_millis(300));
        match &out.outbound[..] {
            [Message::ApplyDamage(dmg)] => {
                assert_eq!(dmg.to, id("p2"));
                assert_eq!(dmg.damage, 10);
            }
            other => panic!("expected applyDamage, got {:?}", other),
        }

        // Still held, but cooling down.
        let out = ctx.apply_intents(punch, t0 + Duration::from_millis(700));
        assert!(out.outbound.is_empty());
    }

    #[test]
    fn test_health_update_from_owner() {
        let mut ctx = context("me");
        seen_at(&mut ctx, "p2", 10.0);
        ctx.handle_message(Message::HealthUpdate(HealthUpdate { id: id("p2"), health: 35 }), Instant::now());
        assert_eq!(ctx.sync().get(&id("p2")).unwrap().health, 35);

        // Unknown and self targets are tolerated.
        ctx.handle_message(Message::HealthUpdate(HealthUpdate { id: id("zz"), health: 1 }), Instant::now());
        ctx.handle_message(Message::HealthUpdate(HealthUpdate { id: id("me"), health: 1 }), Instant::now());
        assert_eq!(ctx.local().health, MAX_HEALTH);
    }

    #[test]
    fn test_opponent_disconnect_ends_duel() {
        let mut ctx = dueling("me", "p2");
        let arena = ctx.duel().active_session().unwrap().arena;
        let out = ctx.handle_message(Message::Disconnect(DisconnectInfo { id: id("p2") }), Instant::now());

        assert!(out.outbound.is_empty());
        assert!(out.scene.contains(&SceneCommand::DestroyArena { arena }));
        assert!(!ctx.duel().is_active());
    }
}
