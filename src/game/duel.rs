//! Duel Negotiation
//!
//! The invite → accept/decline → active → end machine. Each participating
//! client runs its own copy; the relay never sees duel state. Both copies stay
//! in step because they are driven by the same relayed events through the same
//! deterministic reducer:
//!
//! ```text
//!            Challenge                    duelAccepted (from opponent)
//!   Idle ───────────────► Requested ─────────────────────────────┐
//!    │ ▲                      │ proximity lost / peer gone         ▼
//!    │ └──────────────────────┘                                 Active
//!    │  duelInvite                Accept                          │
//!    └───────────► Invited ─────────────────────────────────────►│
//!                    │ Decline / peer gone                        │ duelEnd / own health 0 /
//!                    ▼                                            │ opponent disconnect
//!                   Idle ◄────────────────────────────────────────┘
//! ```
//!
//! The reducer only returns effects; sending, arena construction and health
//! resets are carried out by [`crate::game::context::ClientContext`].

use serde::{Serialize, Deserialize};

use crate::game::state::{ActionState, PlayerId};
use crate::network::protocol::{DuelAccepted, DuelEnd, DuelRequest, Message};

/// Distance within which another participant can be challenged.
pub const PROXIMITY_THRESHOLD: f32 = 5.0;

/// Radius of the arena construct.
pub const ARENA_RADIUS: f32 = 8.0;

/// Lateral distance of each duelist from the arena centre.
pub const ARENA_SPAWN_OFFSET: f32 = 3.0;

/// Opaque handle to an arena construct owned by the scene layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArenaHandle(pub u64);

/// A running duel as seen by one client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelSession {
    /// The challenger
    pub participant_a: PlayerId,
    /// The challenged participant
    pub participant_b: PlayerId,
    /// Always true while held in [`DuelPhase::Active`]
    pub active: bool,
    /// Arena construct created when the duel began
    pub arena: ArenaHandle,
}

impl DuelSession {
    /// True if `id` is one of the two duelists.
    pub fn involves(&self, id: &PlayerId) -> bool {
        &self.participant_a == id || &self.participant_b == id
    }

    /// The other duelist.
    pub fn opponent_of(&self, local: &PlayerId) -> &PlayerId {
        if &self.participant_a == local {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }
}

/// Negotiation phase.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DuelPhase {
    /// No duel, nothing pending.
    #[default]
    Idle,
    /// This client challenged `opponent` and awaits `duelAccepted`.
    Requested {
        /// Challenged participant
        opponent: PlayerId,
    },
    /// `challenger` invited this client; awaiting a local decision.
    Invited {
        /// Who sent the invite
        challenger: PlayerId,
    },
    /// Duel in progress.
    Active(DuelSession),
}

/// Inputs to the reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DuelEvent {
    /// Per-frame list of participants within [`PROXIMITY_THRESHOLD`].
    ProximityScan {
        /// Nearby participants, any order
        nearby: Vec<PlayerId>,
    },
    /// Local participant confirmed the duel prompt.
    Challenge,
    /// `duelInvite` addressed to this client.
    InviteReceived {
        /// Challenger
        from: PlayerId,
    },
    /// Local participant accepted the pending invite.
    Accept,
    /// Local participant declined the pending invite.
    Decline,
    /// `duelAccepted` relayed from another client.
    AcceptedReceived {
        /// Who accepted
        from: PlayerId,
        /// Whose challenge was accepted
        to: PlayerId,
    },
    /// `duelEnd` relayed from another client.
    EndReceived {
        /// Participant that lost
        loser: PlayerId,
        /// Participant that won
        winner: PlayerId,
    },
    /// Local health reached zero.
    LocalDefeated,
    /// A participant's session closed.
    PeerDisconnected {
        /// Departed participant
        id: PlayerId,
    },
}

/// Side effects requested by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum DuelEffect {
    /// Send a message through the relay.
    Send(Message),
    /// Offer the duel prompt for this participant.
    ShowPrompt(PlayerId),
    /// Withdraw the duel prompt.
    HidePrompt,
    /// Show the incoming invite from this participant.
    ShowInvite(PlayerId),
    /// Withdraw the incoming invite.
    HideInvite,
    /// Build the arena for a new duel.
    SpawnArena {
        /// Handle the construct is registered under
        arena: ArenaHandle,
        /// The challenger
        participant_a: PlayerId,
        /// The challenged participant
        participant_b: PlayerId,
    },
    /// Tear down the arena.
    DestroyArena(ArenaHandle),
    /// Restore every known participant to full health.
    ResetHealth,
    /// Play the duel outcome on the local participant.
    PlayOutcome(ActionState),
}

/// Per-client negotiation state.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DuelState {
    phase: DuelPhase,
    prompt: Option<PlayerId>,
    next_arena: u64,
}

/// Pure form of [`DuelState::step`]: `(state, event) -> (state, effects)`.
pub fn transition(mut state: DuelState, local: &PlayerId, event: DuelEvent) -> (DuelState, Vec<DuelEffect>) {
    let effects = state.step(local, event);
    (state, effects)
}

impl DuelState {
    /// Fresh idle machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> &DuelPhase {
        &self.phase
    }

    /// Participant currently offered in the duel prompt.
    pub fn prompt(&self) -> Option<&PlayerId> {
        self.prompt.as_ref()
    }

    /// Running duel, if any.
    pub fn active_session(&self) -> Option<&DuelSession> {
        match &self.phase {
            DuelPhase::Active(session) => Some(session),
            _ => None,
        }
    }

    /// True while a duel is running.
    pub fn is_active(&self) -> bool {
        self.active_session().is_some()
    }

    /// Apply one event, returning the effects to carry out.
    pub fn step(&mut self, local: &PlayerId, event: DuelEvent) -> Vec<DuelEffect> {
        let mut effects = Vec::new();

        match event {
            DuelEvent::ProximityScan { nearby } => {
                self.on_scan(&nearby, &mut effects);
            }

            DuelEvent::Challenge => {
                if !matches!(self.phase, DuelPhase::Idle | DuelPhase::Requested { .. }) {
                    return effects;
                }
                if let Some(target) = self.prompt.take() {
                    effects.push(DuelEffect::HidePrompt);
                    effects.push(DuelEffect::Send(Message::DuelRequest(DuelRequest {
                        from: local.clone(),
                        to: target.clone(),
                    })));
                    self.phase = DuelPhase::Requested { opponent: target };
                }
            }

            DuelEvent::InviteReceived { from } => {
                if &from == local {
                    return effects;
                }
                let accept_invite = match &self.phase {
                    DuelPhase::Idle => true,
                    // Crossed challenges: both sides requested each other.
                    DuelPhase::Requested { opponent } => opponent == &from,
                    DuelPhase::Invited { .. } | DuelPhase::Active(_) => false,
                };
                if accept_invite {
                    self.clear_prompt(&mut effects);
                    effects.push(DuelEffect::ShowInvite(from.clone()));
                    self.phase = DuelPhase::Invited { challenger: from };
                }
            }

            DuelEvent::Accept => {
                if let DuelPhase::Invited { challenger } = &self.phase {
                    let challenger = challenger.clone();
                    effects.push(DuelEffect::HideInvite);
                    effects.push(DuelEffect::Send(Message::DuelAccepted(DuelAccepted {
                        from: local.clone(),
                        to: challenger.clone(),
                    })));
                    self.begin(challenger, local.clone(), &mut effects);
                }
            }

            DuelEvent::Decline => {
                if let DuelPhase::Invited { .. } = self.phase {
                    effects.push(DuelEffect::HideInvite);
                    self.phase = DuelPhase::Idle;
                }
            }

            DuelEvent::AcceptedReceived { from, to } => {
                if &to != local {
                    return effects;
                }
                match &self.phase {
                    DuelPhase::Requested { opponent } if opponent == &from => {
                        self.clear_prompt(&mut effects);
                        self.begin(local.clone(), from, &mut effects);
                    }
                    // Crossed challenges: the peer accepted our request while
                    // we still held its invite.
                    DuelPhase::Invited { challenger } if challenger == &from => {
                        effects.push(DuelEffect::HideInvite);
                        self.begin(local.clone(), from, &mut effects);
                    }
                    _ => {}
                }
            }

            DuelEvent::EndReceived { loser, winner } => {
                let outcome = match &self.phase {
                    DuelPhase::Active(session) if session.involves(&loser) && session.involves(&winner) => {
                        if &loser == local {
                            Some(ActionState::Defeated)
                        } else if &winner == local {
                            Some(ActionState::Victory)
                        } else {
                            None
                        }
                    }
                    _ => None,
                };
                if let Some(outcome) = outcome {
                    effects.push(DuelEffect::PlayOutcome(outcome));
                    self.terminate(&mut effects);
                }
            }

            DuelEvent::LocalDefeated => {
                if let DuelPhase::Active(session) = &self.phase {
                    let winner = session.opponent_of(local).clone();
                    effects.push(DuelEffect::Send(Message::DuelEnd(DuelEnd {
                        loser_id: local.clone(),
                        winner_id: winner,
                    })));
                    effects.push(DuelEffect::PlayOutcome(ActionState::Defeated));
                    self.terminate(&mut effects);
                }
            }

            DuelEvent::PeerDisconnected { id } => {
                if self.prompt.as_ref() == Some(&id) {
                    self.clear_prompt(&mut effects);
                }
                match &self.phase {
                    DuelPhase::Active(session) if session.opponent_of(local) == &id => {
                        self.terminate(&mut effects);
                    }
                    DuelPhase::Requested { opponent } if opponent == &id => {
                        self.phase = DuelPhase::Idle;
                    }
                    DuelPhase::Invited { challenger } if challenger == &id => {
                        effects.push(DuelEffect::HideInvite);
                        self.phase = DuelPhase::Idle;
                    }
                    _ => {}
                }
            }
        }

        effects
    }

    fn on_scan(&mut self, nearby: &[PlayerId], effects: &mut Vec<DuelEffect>) {
        if let DuelPhase::Requested { opponent } = &self.phase {
            if !nearby.contains(opponent) {
                self.phase = DuelPhase::Idle;
            }
        }

        if !matches!(self.phase, DuelPhase::Idle | DuelPhase::Requested { .. }) {
            return;
        }

        let candidate = match nearby {
            [only] => Some(only.clone()),
            _ => None,
        };

        if candidate == self.prompt {
            return;
        }

        match &candidate {
            Some(id) => effects.push(DuelEffect::ShowPrompt(id.clone())),
            None => effects.push(DuelEffect::HidePrompt),
        }
        self.prompt = candidate;
    }

    fn clear_prompt(&mut self, effects: &mut Vec<DuelEffect>) {
        if self.prompt.take().is_some() {
            effects.push(DuelEffect::HidePrompt);
        }
    }

    fn begin(&mut self, participant_a: PlayerId, participant_b: PlayerId, effects: &mut Vec<DuelEffect>) {
        let arena = ArenaHandle(self.next_arena);
        self.next_arena += 1;

        effects.push(DuelEffect::SpawnArena {
            arena,
            participant_a: participant_a.clone(),
            participant_b: participant_b.clone(),
        });
        self.phase = DuelPhase::Active(DuelSession {
            participant_a,
            participant_b,
            active: true,
            arena,
        });
    }

    fn terminate(&mut self, effects: &mut Vec<DuelEffect>) {
        if let DuelPhase::Active(session) = std::mem::take(&mut self.phase) {
            effects.push(DuelEffect::ResetHealth);
            effects.push(DuelEffect::DestroyArena(session.arena));
        }
    }
}
