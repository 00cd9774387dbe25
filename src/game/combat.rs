//! Combat Resolution
//!
//! Attack wind-up, cooldown, range check and local damage taking.
//!
//! Each client is the sole writer of its own participant's health. An attacker
//! only decides whether a hit *landed* (and says so with `applyDamage`); the
//! victim applies its own mitigation in [`CombatResolver::take_damage`]. The
//! rules that decide either side live behind [`CombatAuthority`] so a
//! validating relay-side authority can replace the client one without touching
//! duel negotiation.

use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};

use crate::game::state::{ActionState, PlayerState, MAX_HEALTH};
use crate::network::protocol::{ApplyDamage, HealthUpdate, Message};

/// Maximum distance (exclusive) at which an attack connects.
pub const ATTACK_RANGE: f32 = 2.0;

/// Minimum time between two resolved attacks.
pub const ATTACK_COOLDOWN: Duration = Duration::from_millis(1000);

/// How long the hit reaction animation locks the victim.
pub const HIT_REACTION_LOCK: Duration = Duration::from_millis(500);

/// Damage dealt by a punch.
pub const PUNCH_DAMAGE: u8 = 10;

/// Damage dealt by a kick.
pub const KICK_DAMAGE: u8 = 15;

// =============================================================================
// ATTACK KINDS
// =============================================================================

/// Attack intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttackKind {
    /// Quick, short wind-up
    Punch,
    /// Slower, harder
    Kick,
}

impl AttackKind {
    /// Fixed damage carried in `applyDamage`.
    pub fn damage(self) -> u8 {
        match self {
            AttackKind::Punch => PUNCH_DAMAGE,
            AttackKind::Kick => KICK_DAMAGE,
        }
    }

    /// Time the intent must be held before the attack resolves.
    pub fn windup(self) -> Duration {
        match self {
            AttackKind::Punch => Duration::from_millis(300),
            AttackKind::Kick => Duration::from_millis(500),
        }
    }

    /// Action state shown while winding up.
    pub fn action_state(self) -> ActionState {
        match self {
            AttackKind::Punch => ActionState::Punching,
            AttackKind::Kick => ActionState::Kicking,
        }
    }
}

// =============================================================================
// AUTHORITY
// =============================================================================

/// Rules deciding whether an attack lands and how much of it a victim takes.
pub trait CombatAuthority: Send + Sync {
    /// Damage to request from `target`, or `None` if the attack misses.
    fn resolve_hit(&self, attacker: &PlayerState, target: &PlayerState, kind: AttackKind) -> Option<u8>;

    /// Damage the victim actually takes from an incoming `amount`.
    fn mitigate(&self, victim: &PlayerState, amount: u8) -> u8;
}

/// Client-authoritative rules: the attacker range-checks against its replica
/// of the opponent, the victim ignores everything while blocking.
#[derive(Debug, Clone, Copy)]
pub struct ClientAuthority {
    /// Attack range (exclusive).
    pub attack_range: f32,
}

impl Default for ClientAuthority {
    fn default() -> Self {
        Self { attack_range: ATTACK_RANGE }
    }
}

impl CombatAuthority for ClientAuthority {
    fn resolve_hit(&self, attacker: &PlayerState, target: &PlayerState, kind: AttackKind) -> Option<u8> {
        if attacker.position.distance(target.position) < self.attack_range {
            Some(kind.damage())
        } else {
            None
        }
    }

    fn mitigate(&self, victim: &PlayerState, amount: u8) -> u8 {
        if victim.is_blocking() {
            0
        } else {
            amount
        }
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of an attack attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttackOutcome {
    /// Still cooling down; nothing happened.
    Ignored,
    /// Swung and missed (out of range or no opponent). Cooldown started.
    Missed,
    /// In range. Cooldown started; the message goes to the relay.
    Hit(Message),
}

/// Result of incoming damage on the local participant.
#[derive(Debug, Clone, PartialEq)]
pub enum DamageOutcome {
    /// Fully mitigated; health untouched, nothing broadcast.
    Blocked,
    /// Health reduced. Carries the `healthUpdate` to broadcast.
    Hit {
        /// Health after the hit
        health: u8,
        /// Broadcast of the new health
        update: Message,
    },
    /// Health reached zero. Duel end handling must follow.
    Defeated {
        /// Broadcast of the zero health
        update: Message,
    },
}

#[derive(Debug, Clone, Copy)]
struct Windup {
    kind: AttackKind,
    started_at: Instant,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Per-client combat state.
pub struct CombatResolver {
    authority: Box<dyn CombatAuthority>,
    cooldown: Duration,
    cooldown_until: Option<Instant>,
    windup: Option<Windup>,
    lock_until: Option<Instant>,
}

impl std::fmt::Debug for CombatResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatResolver")
            .field("cooldown", &self.cooldown)
            .field("cooldown_until", &self.cooldown_until)
            .field("windup", &self.windup)
            .field("lock_until", &self.lock_until)
            .finish()
    }
}

impl Default for CombatResolver {
    fn default() -> Self {
        Self::new(Box::new(ClientAuthority::default()), ATTACK_COOLDOWN)
    }
}

impl CombatResolver {
    /// Create a resolver with the given authority and cooldown.
    pub fn new(authority: Box<dyn CombatAuthority>, cooldown: Duration) -> Self {
        Self {
            authority,
            cooldown,
            cooldown_until: None,
            windup: None,
            lock_until: None,
        }
    }

    /// True while further attacks are ignored.
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(false, |until| now < until)
    }

    /// Attack currently winding up, if any.
    pub fn pending_attack(&self) -> Option<AttackKind> {
        self.windup.map(|w| w.kind)
    }

    /// True while a locking animation (hit reaction) is playing.
    pub fn is_locked(&self, now: Instant) -> bool {
        self.lock_until.map_or(false, |until| now < until)
    }

    /// Start winding up an attack. Returns false if the intent is ignored.
    pub fn begin_attack(&mut self, kind: AttackKind, now: Instant) -> bool {
        if self.windup.is_some() || self.is_cooling_down(now) || self.is_locked(now) {
            return false;
        }
        self.windup = Some(Windup { kind, started_at: now });
        true
    }

    /// Advance the wind-up.
    ///
    /// Returns the attack once its wind-up has elapsed with the intent still
    /// held. Releasing early cancels it.
    pub fn poll_windup(&mut self, now: Instant, held: impl Fn(AttackKind) -> bool) -> Option<AttackKind> {
        let windup = self.windup?;
        if !held(windup.kind) {
            self.windup = None;
            return None;
        }
        if now.duration_since(windup.started_at) >= windup.kind.windup() {
            self.windup = None;
            return Some(windup.kind);
        }
        None
    }

    /// Resolve a completed attack against the active opponent.
    ///
    /// The cooldown starts whether or not the range check passes.
    pub fn attempt_attack(
        &mut self,
        now: Instant,
        attacker: &PlayerState,
        opponent: Option<&PlayerState>,
        kind: AttackKind,
    ) -> AttackOutcome {
        if self.is_cooling_down(now) {
            return AttackOutcome::Ignored;
        }
        self.cooldown_until = Some(now + self.cooldown);

        let Some(target) = opponent else {
            return AttackOutcome::Missed;
        };

        match self.authority.resolve_hit(attacker, target, kind) {
            Some(damage) => AttackOutcome::Hit(Message::ApplyDamage(ApplyDamage {
                to: target.id.clone(),
                damage,
                from: Some(attacker.id.clone()),
                attack: Some(kind),
            })),
            None => AttackOutcome::Missed,
        }
    }

    /// Apply incoming damage to the local participant.
    ///
    /// This is the only place local health decreases.
    pub fn take_damage(&mut self, victim: &mut PlayerState, amount: u8, now: Instant) -> DamageOutcome {
        let taken = self.authority.mitigate(victim, amount);
        if taken == 0 {
            return DamageOutcome::Blocked;
        }

        let health = victim.apply_health_delta(-(taken as i32));
        debug_assert!(health <= MAX_HEALTH);
        let update = Message::HealthUpdate(HealthUpdate {
            id: victim.id.clone(),
            health,
        });

        if health == 0 {
            victim.action_state = ActionState::Defeated;
            self.windup = None;
            return DamageOutcome::Defeated { update };
        }

        victim.action_state = ActionState::TakingHit;
        self.windup = None;
        self.lock_until = Some(now + HIT_REACTION_LOCK);
        DamageOutcome::Hit { health, update }
    }

    /// Hold the participant for `duration` (victory or defeat animation).
    pub fn lock_for(&mut self, now: Instant, duration: Duration) {
        self.windup = None;
        self.lock_until = Some(now + duration);
    }

    /// Forget wind-up, cooldown and locks (duel teardown).
    pub fn reset(&mut self) {
        self.cooldown_until = None;
        self.windup = None;
        self.lock_until = None;
    }
}
