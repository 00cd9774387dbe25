//! Protocol Messages
//!
//! Wire format shared by the relay and its clients. Every frame is a JSON text
//! envelope with a `type` discriminator and camelCase payload fields:
//!
//! ```text
//! {"type":"move","position":{"x":1.0,"y":0.0,"z":2.0},"rotationY":0.5,"state":"walking"}
//! ```
//!
//! `Message` is a closed sum type. The router and the client context both
//! match on it exhaustively, so adding a kind is a compile error everywhere it
//! has to be handled.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::combat::AttackKind;
use crate::game::state::{ActionState, PlayerId};

/// Every message kind that travels between relay and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Server -> new client: the identifier issued at accept time.
    Init(InitInfo),

    /// Client -> server: periodic local state sample.
    Move(MoveUpdate),

    /// Server -> others: a `move` re-labelled with its sender.
    PlayerUpdate(PlayerUpdate),

    /// Server -> others: a session closed.
    Disconnect(DisconnectInfo),

    /// Client -> others: challenge a nearby participant.
    DuelRequest(DuelRequest),

    /// Relayed invite naming only the challenger.
    DuelInvite(DuelInvite),

    /// Client -> others: a challenge was accepted.
    DuelAccepted(DuelAccepted),

    /// Client -> others: a duel finished.
    DuelEnd(DuelEnd),

    /// Client -> others: the sender's new health.
    HealthUpdate(HealthUpdate),

    /// Client -> others: a landed attack for the addressee to apply.
    ApplyDamage(ApplyDamage),
}

/// Identifier issued to a new connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitInfo {
    /// The connection's participant identifier.
    pub id: PlayerId,
}

/// Local state sample sent on the fixed cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveUpdate {
    /// World position.
    pub position: Vec3,
    /// Heading (radians). Early clients omit it.
    #[serde(default)]
    pub rotation_y: f32,
    /// Action label. Early clients omit it.
    #[serde(default)]
    pub state: ActionState,
}

/// A relayed sample with its sender attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    /// Sender of the original `move`.
    pub id: PlayerId,
    /// World position.
    pub position: Vec3,
    /// Heading (radians).
    #[serde(default)]
    pub rotation_y: f32,
    /// Action label.
    #[serde(default)]
    pub state: ActionState,
}

impl PlayerUpdate {
    /// Attach a sender to a `move` payload.
    pub fn from_move(id: PlayerId, update: MoveUpdate) -> Self {
        Self {
            id,
            position: update.position,
            rotation_y: update.rotation_y,
            state: update.state,
        }
    }
}

/// A session that went away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    /// The departed participant.
    pub id: PlayerId,
}

/// Challenge from one participant to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelRequest {
    /// Challenger.
    pub from: PlayerId,
    /// Challenged participant.
    pub to: PlayerId,
}

/// A challenge as seen by its addressee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelInvite {
    /// Challenger.
    pub from: PlayerId,
}

/// Acceptance of a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelAccepted {
    /// The participant who accepted.
    pub from: PlayerId,
    /// The original challenger.
    pub to: PlayerId,
}

/// Outcome of a duel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelEnd {
    /// Participant whose health reached zero.
    pub loser_id: PlayerId,
    /// The other participant.
    pub winner_id: PlayerId,
}

/// Health broadcast by the participant that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    /// Owner of the health value.
    pub id: PlayerId,
    /// New health.
    pub health: u8,
}

/// Attack that landed according to the attacker's range check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyDamage {
    /// Participant who should take the damage.
    pub to: PlayerId,
    /// Damage before the victim's own mitigation.
    pub damage: u8,
    /// Attacker, when the client includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PlayerId>,
    /// Attack kind, when the client includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackKind>,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl Message {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Init(_) => "init",
            Message::Move(_) => "move",
            Message::PlayerUpdate(_) => "playerUpdate",
            Message::Disconnect(_) => "disconnect",
            Message::DuelRequest(_) => "duelRequest",
            Message::DuelInvite(_) => "duelInvite",
            Message::DuelAccepted(_) => "duelAccepted",
            Message::DuelEnd(_) => "duelEnd",
            Message::HealthUpdate(_) => "healthUpdate",
            Message::ApplyDamage(_) => "applyDamage",
        }
    }

    /// Kinds only the relay may originate.
    pub fn is_server_only(&self) -> bool {
        matches!(
            self,
            Message::Init(_) | Message::PlayerUpdate(_) | Message::Disconnect(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_wire_shape() {
        let msg = Message::Move(MoveUpdate {
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation_y: 0.5,
            state: ActionState::Walking,
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"move\""));
        assert!(json.contains("\"rotationY\":0.5"));
        assert!(json.contains("\"state\":\"walking\""));

        let parsed = Message::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_position_only_move_defaults() {
        // Clients that predate facing/action sampling send only a position.
        let parsed = Message::from_json(
            r#"{"type":"move","position":{"x":3,"y":1,"z":-2}}"#,
        ).unwrap();

        if let Message::Move(update) = parsed {
            assert_eq!(update.position, Vec3::new(3.0, 1.0, -2.0));
            assert_eq!(update.rotation_y, 0.0);
            assert_eq!(update.state, ActionState::Idle);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_duel_end_field_names() {
        let msg = Message::DuelEnd(DuelEnd {
            loser_id: PlayerId::new("a"),
            winner_id: PlayerId::new("b"),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"duelEnd\""));
        assert!(json.contains("\"loserId\":\"a\""));
        assert!(json.contains("\"winnerId\":\"b\""));
    }

    #[test]
    fn test_apply_damage_optional_fields() {
        let parsed = Message::from_json(r#"{"type":"applyDamage","to":"p2","damage":15}"#).unwrap();
        if let Message::ApplyDamage(dmg) = &parsed {
            assert_eq!(dmg.to, PlayerId::new("p2"));
            assert_eq!(dmg.damage, 15);
            assert!(dmg.from.is_none());
            assert!(dmg.attack.is_none());
        } else {
            panic!("Wrong message type");
        }

        let json = parsed.to_json().unwrap();
        assert!(!json.contains("attack"));
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(Message::from_json("not json").is_err());
        assert!(Message::from_json(r#"{"type":"teleport","id":"x"}"#).is_err());
        assert!(Message::from_json(r#"{"type":"healthUpdate","id":"x"}"#).is_err());
        assert!(Message::from_json(r#"{"type":"healthUpdate","id":"x","health":300}"#).is_err());
    }

    #[test]
    fn test_kind_matches_tag() {
        let msgs = vec![
            Message::Init(InitInfo { id: PlayerId::new("a") }),
            Message::Disconnect(DisconnectInfo { id: PlayerId::new("a") }),
            Message::DuelInvite(DuelInvite { from: PlayerId::new("a") }),
            Message::HealthUpdate(HealthUpdate { id: PlayerId::new("a"), health: 40 }),
        ];

        for msg in msgs {
            let json = msg.to_json().unwrap();
            assert!(json.contains(&format!("\"type\":\"{}\"", msg.kind())));
        }
    }

    #[test]
    fn test_server_only_kinds() {
        assert!(Message::Init(InitInfo { id: PlayerId::new("a") }).is_server_only());
        assert!(!Message::DuelInvite(DuelInvite { from: PlayerId::new("a") }).is_server_only());
    }
}
