//! Network Layer
//!
//! WebSocket relay server, its session registry, the shared wire protocol,
//! and the client-side connection runtime.

pub mod client;
pub mod protocol;
pub mod session;
pub mod server;

pub use client::{connect, ClientDriver, ClientError, ClientRuntimeConfig, Connection, ControlFrame, Controller};
pub use protocol::Message;
pub use session::{SessionHandle, SessionRegistry};
pub use server::{route, RelayConfig, RelayError, RelayServer, Route};
