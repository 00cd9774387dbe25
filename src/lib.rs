//! # EmberLands Presence Relay
//!
//! Real-time multiplayer presence for a shared 3D world: a WebSocket relay
//! that forwards participant state between clients, and the client core that
//! smooths remote participants and negotiates one-on-one duels.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   EMBERLANDS PRESENCE RELAY                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Math primitives                           │
//! │  └── vec3.rs     - Float 3D vector, angle helpers            │
//! │                                                              │
//! │  game/           - Client-side rules (no I/O)                │
//! │  ├── state.rs    - Participant identity, action, health      │
//! │  ├── input.rs    - Held-key intents                          │
//! │  ├── sync.rs     - Outbound sampling, smoothed replicas      │
//! │  ├── duel.rs     - Duel negotiation reducer                  │
//! │  ├── combat.rs   - Wind-up, cooldown, damage                 │
//! │  ├── scene.rs    - Presentation layer seam                   │
//! │  └── context.rs  - Client context                            │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Session registry                          │
//! │  ├── server.rs   - WebSocket relay and router                │
//! │  └── client.rs   - Connection and driver loop                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Model
//!
//! The relay is stateless beyond the session registry. Each client owns its
//! participant's position, action and health; attacks are range-checked by the
//! attacker and mitigated by the victim. Duel state lives only on the two
//! participating clients, kept in step by relayed events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::vec3::Vec3;
pub use game::context::{ClientContext, Outcome};
pub use game::state::{ActionState, PlayerId, PlayerState};
pub use network::protocol::Message;
pub use network::server::{RelayConfig, RelayServer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
