//! Game Logic Module
//!
//! Client-side participant state and the rules the relay never sees.
//!
//! ## Module Structure
//!
//! - `state`: Participant identity, action state, health
//! - `input`: Held-key intents
//! - `sync`: Outbound sampling and smoothed remote replicas
//! - `duel`: Duel negotiation reducer
//! - `combat`: Wind-up, cooldown, range check, damage taking
//! - `scene`: Presentation layer seam
//! - `context`: The client context tying the above together

pub mod combat;
pub mod context;
pub mod duel;
pub mod input;
pub mod scene;
pub mod state;
pub mod sync;

// Re-export key types
pub use combat::{AttackKind, CombatAuthority, CombatResolver};
pub use context::{ClientConfig, ClientContext, Outcome};
pub use duel::{DuelEffect, DuelEvent, DuelPhase, DuelSession, DuelState};
pub use input::InputIntents;
pub use scene::{HeadlessScene, Scene, SceneCommand};
pub use state::{ActionState, PlayerId, PlayerState};
pub use sync::StateSynchronizer;
