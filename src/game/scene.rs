//! Scene Collaborator
//!
//! The presentation layer (rendering, physics bodies, animation, UI) is not
//! part of this crate. The client context describes what it needs from that
//! layer as [`SceneCommand`]s; a [`Scene`] implementation carries them out.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

use crate::core::vec3::Vec3;
use crate::game::duel::ArenaHandle;
use crate::game::state::{ActionState, PlayerId};

/// Requests from the client core to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    /// Create a participant's visual and body.
    SpawnParticipant {
        /// Participant
        id: PlayerId,
        /// Initial position
        position: Vec3,
    },
    /// Remove a participant's visual and body.
    DespawnParticipant {
        /// Participant
        id: PlayerId,
    },
    /// Build the duel arena.
    CreateArena {
        /// Handle for later teardown
        arena: ArenaHandle,
        /// Centre point
        center: Vec3,
        /// Wall radius
        radius: f32,
    },
    /// Tear the duel arena down.
    DestroyArena {
        /// Handle given at creation
        arena: ArenaHandle,
    },
    /// Play an action animation on a participant.
    PlayAction {
        /// Participant
        id: PlayerId,
        /// Action to show
        action: ActionState,
        /// Time the animation holds the participant, if any
        lock: Option<Duration>,
    },
    /// Move the local participant's body.
    TeleportLocal {
        /// Destination
        position: Vec3,
    },
    /// Offer (Some) or withdraw (None) the duel prompt.
    DuelPrompt(Option<PlayerId>),
    /// Show (Some) or hide (None) an incoming invite.
    DuelInvite(Option<PlayerId>),
}

/// Presentation layer operations the client core relies on.
pub trait Scene {
    /// Create a participant visual and body at `position`.
    fn spawn_participant(&mut self, id: &PlayerId, position: Vec3);

    /// Destroy a participant. Must tolerate unknown ids.
    fn despawn_participant(&mut self, id: &PlayerId);

    /// Create the arena construct.
    fn create_arena(&mut self, arena: ArenaHandle, center: Vec3, radius: f32);

    /// Destroy the arena construct. Must tolerate already-destroyed handles.
    fn destroy_arena(&mut self, arena: ArenaHandle);

    /// Play a named action animation with an optional lock duration.
    fn play_action(&mut self, id: &PlayerId, name: &str, lock: Option<Duration>);

    /// Move the local body.
    fn teleport_local(&mut self, _position: Vec3) {}

    /// Duel prompt visibility.
    fn set_duel_prompt(&mut self, _opponent: Option<&PlayerId>) {}

    /// Incoming invite visibility.
    fn set_duel_invite(&mut self, _challenger: Option<&PlayerId>) {}

    /// Dispatch one command.
    fn apply(&mut self, command: &SceneCommand) {
        match command {
            SceneCommand::SpawnParticipant { id, position } => self.spawn_participant(id, *position),
            SceneCommand::DespawnParticipant { id } => self.despawn_participant(id),
            SceneCommand::CreateArena { arena, center, radius } => self.create_arena(*arena, *center, *radius),
            SceneCommand::DestroyArena { arena } => self.destroy_arena(*arena),
            SceneCommand::PlayAction { id, action, lock } => self.play_action(id, action.animation_name(), *lock),
            SceneCommand::TeleportLocal { position } => self.teleport_local(*position),
            SceneCommand::DuelPrompt(opponent) => self.set_duel_prompt(opponent.as_ref()),
            SceneCommand::DuelInvite(challenger) => self.set_duel_invite(challenger.as_ref()),
        }
    }
}

/// Scene without a renderer: tracks what would be on screen and logs it.
///
/// Used by the headless bot and by tests.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    /// Participants currently spawned, with their spawn position
    pub participants: BTreeMap<PlayerId, Vec3>,
    /// Live arenas
    pub arenas: BTreeSet<ArenaHandle>,
    /// Local body position after the last teleport
    pub local_position: Option<Vec3>,
    /// Visible duel prompt
    pub prompt: Option<PlayerId>,
    /// Visible duel invite
    pub invite: Option<PlayerId>,
    /// Last action played per participant
    pub last_action: BTreeMap<PlayerId, String>,
}

impl Scene for HeadlessScene {
    fn spawn_participant(&mut self, id: &PlayerId, position: Vec3) {
        debug!("spawn {} at {}", id.short(), position);
        self.participants.insert(id.clone(), position);
    }

    fn despawn_participant(&mut self, id: &PlayerId) {
        if self.participants.remove(id).is_some() {
            debug!("despawn {}", id.short());
        }
    }

    fn create_arena(&mut self, arena: ArenaHandle, center: Vec3, radius: f32) {
        debug!("arena {:?} at {} (r={})", arena, center, radius);
        self.arenas.insert(arena);
    }

    fn destroy_arena(&mut self, arena: ArenaHandle) {
        if self.arenas.remove(&arena) {
            debug!("arena {:?} destroyed", arena);
        }
    }

    fn play_action(&mut self, id: &PlayerId, name: &str, lock: Option<Duration>) {
        debug!("{} plays {} (lock {:?})", id.short(), name, lock);
        self.last_action.insert(id.clone(), name.to_string());
    }

    fn teleport_local(&mut self, position: Vec3) {
        self.local_position = Some(position);
    }

    fn set_duel_prompt(&mut self, opponent: Option<&PlayerId>) {
        self.prompt = opponent.cloned();
    }

    fn set_duel_invite(&mut self, challenger: Option<&PlayerId>) {
        self.invite = challenger.cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_scene_tracks_commands() {
        let mut scene = HeadlessScene::default();
        let id = PlayerId::new("p2");

        scene.apply(&SceneCommand::SpawnParticipant { id: id.clone(), position: Vec3::ZERO });
        scene.apply(&SceneCommand::CreateArena { arena: ArenaHandle(3), center: Vec3::ZERO, radius: 8.0 });
        scene.apply(&SceneCommand::PlayAction { id: id.clone(), action: ActionState::TakingHit, lock: None });
        scene.apply(&SceneCommand::DuelPrompt(Some(id.clone())));

        assert!(scene.participants.contains_key(&id));
        assert!(scene.arenas.contains(&ArenaHandle(3)));
        assert_eq!(scene.last_action.get(&id).map(String::as_str), Some("takingHit"));
        assert_eq!(scene.prompt, Some(id.clone()));
    }

    #[test]
    fn test_destroy_twice_is_noop() {
        let mut scene = HeadlessScene::default();
        scene.create_arena(ArenaHandle(0), Vec3::ZERO, 8.0);
        scene.destroy_arena(ArenaHandle(0));
        scene.destroy_arena(ArenaHandle(0));
        scene.despawn_participant(&PlayerId::new("ghost"));
        assert!(scene.arenas.is_empty());
    }
}
