//! Player State Definitions
//!
//! The per-participant model held by every client: position, facing,
//! discrete action state and health. The local copy is ground truth; remote
//! copies are replicas maintained by [`crate::game::sync`].

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;

/// Full health. Also the value every participant is reset to when a duel ends.
pub const MAX_HEALTH: u8 = 100;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Opaque participant identifier.
///
/// Issued by the relay at connect time (UUID v4 text) and echoed verbatim in
/// every payload that names a participant. Ordered so it can key a `BTreeMap`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Wrap an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// ACTION STATE
// =============================================================================

/// Discrete animation/behaviour label.
///
/// Drives both visuals and gameplay rules: `Blocking` suppresses damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[derive(Default)]
pub enum ActionState {
    /// Standing still
    #[default]
    Idle,
    /// Moving on the ground
    Walking,
    /// Airborne
    Jump,
    /// Guarding; incoming damage is ignored
    Blocking,
    /// Punch wind-up or strike
    Punching,
    /// Kick wind-up or strike
    Kicking,
    /// Hit reaction
    TakingHit,
    /// Won the last duel
    Victory,
    /// Lost the last duel
    Defeated,
}

impl ActionState {
    /// Animation clip name the presentation layer plays for this state.
    pub fn animation_name(self) -> &'static str {
        match self {
            ActionState::Idle => "idle",
            ActionState::Walking => "walking",
            ActionState::Jump => "jump",
            ActionState::Blocking => "blocking",
            ActionState::Punching => "punching",
            ActionState::Kicking => "kicking",
            ActionState::TakingHit => "takingHit",
            ActionState::Victory => "victory",
            ActionState::Defeated => "defeated",
        }
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Participant identifier
    pub id: PlayerId,

    /// World position
    pub position: Vec3,

    /// Heading around the vertical axis (radians)
    pub rotation_y: f32,

    /// Current action label
    pub action_state: ActionState,

    /// Health in `0..=MAX_HEALTH`
    pub health: u8,
}

impl PlayerState {
    /// New participant at full health.
    pub fn new(id: PlayerId, position: Vec3) -> Self {
        Self {
            id,
            position,
            rotation_y: 0.0,
            action_state: ActionState::Idle,
            health: MAX_HEALTH,
        }
    }

    /// True while guarding.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.action_state == ActionState::Blocking
    }

    /// Restore full health.
    pub fn reset_health(&mut self) {
        self.health = MAX_HEALTH;
    }

    /// Apply a signed health delta, clamped into `0..=MAX_HEALTH`.
    pub fn apply_health_delta(&mut self, delta: i32) -> u8 {
        let next = (self.health as i32 + delta).clamp(0, MAX_HEALTH as i32);
        self.health = next as u8;
        self.health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_generate_unique() {
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_player_id_short_on_tiny_token() {
        let id = PlayerId::new("p1");
        assert_eq!(id.short(), "p1");
    }

    #[test]
    fn test_action_state_wire_names() {
        let json = serde_json::to_string(&ActionState::TakingHit).unwrap();
        assert_eq!(json, "\"takingHit\"");
        let parsed: ActionState = serde_json::from_str("\"blocking\"").unwrap();
        assert_eq!(parsed, ActionState::Blocking);
        assert_eq!(ActionState::Jump.animation_name(), "jump");
    }

    #[test]
    fn test_health_delta_clamps() {
        let mut p = PlayerState::new(PlayerId::new("p1"), Vec3::ZERO);
        assert_eq!(p.apply_health_delta(-30), 70);
        assert_eq!(p.apply_health_delta(-500), 0);
        assert_eq!(p.health, 0);
        assert_eq!(p.apply_health_delta(500), MAX_HEALTH);
        p.health = 5;
        p.reset_health();
        assert_eq!(p.health, MAX_HEALTH);
    }
}
