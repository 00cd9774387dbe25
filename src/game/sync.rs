//! State Synchronization
//!
//! Emits the local participant's state on a fixed cadence and keeps one
//! smoothed replica per remote participant.
//!
//! Replicas converge by exponential smoothing: every simulated step moves the
//! rendered position `lerp_alpha` of the remaining distance toward the last
//! received target. The first sample for a new replica snaps.
//!
//! Samples are applied in arrival order. Duplicates and reordering are not
//! detected; the most recently received sample always wins.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::core::vec3::{lerp_angle, Vec3};
use crate::game::state::{ActionState, PlayerId, PlayerState, MAX_HEALTH};
use crate::network::protocol::{Message, MoveUpdate, PlayerUpdate};

/// Outbound sample period.
pub const SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Fraction of the remaining distance covered per step.
pub const LERP_ALPHA: f32 = 0.1;

/// Smoothed copy of a remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReplica {
    /// Participant identifier
    pub id: PlayerId,
    /// Position shown this frame
    pub rendered_position: Vec3,
    /// Last received position
    pub target_position: Vec3,
    /// Heading shown this frame
    pub rendered_rotation_y: f32,
    /// Last received heading
    pub target_rotation_y: f32,
    /// Last received action label
    pub action_state: ActionState,
    /// Last health the owner broadcast
    pub health: u8,
}

impl RemoteReplica {
    /// Replica snapped at its first sample.
    pub fn from_update(update: &PlayerUpdate) -> Self {
        Self {
            id: update.id.clone(),
            rendered_position: update.position,
            target_position: update.position,
            rendered_rotation_y: update.rotation_y,
            target_rotation_y: update.rotation_y,
            action_state: update.state,
            health: MAX_HEALTH,
        }
    }

    /// Overwrite the target; the rendered pose catches up in [`Self::step`].
    pub fn retarget(&mut self, update: &PlayerUpdate) {
        self.target_position = update.position;
        self.target_rotation_y = update.rotation_y;
        self.action_state = update.state;
    }

    /// One smoothing step.
    pub fn step(&mut self, alpha: f32) {
        self.rendered_position = self.rendered_position.lerp(self.target_position, alpha);
        self.rendered_rotation_y = lerp_angle(self.rendered_rotation_y, self.target_rotation_y, alpha);
    }

    /// Snapshot as a `PlayerState` at the rendered pose.
    pub fn to_player_state(&self) -> PlayerState {
        PlayerState {
            id: self.id.clone(),
            position: self.rendered_position,
            rotation_y: self.rendered_rotation_y,
            action_state: self.action_state,
            health: self.health,
        }
    }
}

/// What a received sample did to the replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaChange {
    /// First sample for this participant; replica created at the sample.
    Created,
    /// Existing replica retargeted.
    Updated,
}

/// Synchronizer configuration.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Outbound sample period.
    pub send_interval: Duration,
    /// Smoothing factor per step.
    pub lerp_alpha: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            send_interval: SEND_INTERVAL,
            lerp_alpha: LERP_ALPHA,
        }
    }
}

/// Outbound sampler plus remote replica set.
#[derive(Debug, Clone, Default)]
pub struct StateSynchronizer {
    config: SyncConfig,
    replicas: BTreeMap<PlayerId, RemoteReplica>,
    last_sent: Option<Instant>,
}

impl StateSynchronizer {
    /// Create with the given configuration.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            replicas: BTreeMap::new(),
            last_sent: None,
        }
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Build the `move` for the local participant if a period has elapsed.
    ///
    /// No delta compression: an unchanged state is still sent.
    pub fn sample(&mut self, now: Instant, local: &PlayerState) -> Option<Message> {
        if let Some(last) = self.last_sent {
            if now.duration_since(last) < self.config.send_interval {
                return None;
            }
        }
        self.last_sent = Some(now);
        Some(Message::Move(MoveUpdate {
            position: local.position,
            rotation_y: local.rotation_y,
            state: local.action_state,
        }))
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Merge a relayed sample.
    pub fn apply_update(&mut self, update: &PlayerUpdate) -> ReplicaChange {
        match self.replicas.get_mut(&update.id) {
            Some(replica) => {
                replica.retarget(update);
                ReplicaChange::Updated
            }
            None => {
                self.replicas.insert(update.id.clone(), RemoteReplica::from_update(update));
                ReplicaChange::Created
            }
        }
    }

    /// Advance every replica by one smoothing step.
    pub fn step(&mut self) {
        let alpha = self.config.lerp_alpha;
        for replica in self.replicas.values_mut() {
            replica.step(alpha);
        }
    }

    /// Record a broadcast health value. Unknown ids are ignored.
    pub fn set_health(&mut self, id: &PlayerId, health: u8) -> bool {
        match self.replicas.get_mut(id) {
            Some(replica) => {
                replica.health = health.min(MAX_HEALTH);
                true
            }
            None => false,
        }
    }

    /// Restore every replica to full health.
    pub fn reset_health(&mut self) {
        for replica in self.replicas.values_mut() {
            replica.health = MAX_HEALTH;
        }
    }

    /// Forget a participant. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &PlayerId) -> Option<RemoteReplica> {
        self.replicas.remove(id)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Replica for a participant.
    pub fn get(&self, id: &PlayerId) -> Option<&RemoteReplica> {
        self.replicas.get(id)
    }

    /// All replicas in id order.
    pub fn replicas(&self) -> impl Iterator<Item = &RemoteReplica> {
        self.replicas.values()
    }

    /// Number of known remote participants.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// True if no remote participant is known.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Participants whose rendered position lies within `radius` of `origin`.
    pub fn within(&self, origin: Vec3, radius: f32) -> Vec<PlayerId> {
        let radius_sq = radius * radius;
        self.replicas
            .values()
            .filter(|r| r.rendered_position.distance_squared(origin) <= radius_sq)
            .map(|r| r.id.clone())
            .collect()
    }
}
