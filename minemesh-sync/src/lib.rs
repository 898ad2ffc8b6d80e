//! # minemesh-sync: Peer-to-peer state sync for minemesh
//!
//! Keeps a group of directly linked peers agreeing on who is present, what
//! was said, and which minesweeper session (if any) is running.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────┐  TransportEvent  ┌──────────────────────────────────┐
//!   │Transport │ ───────────────► │ Peer (dispatcher)                │
//!   │ memory / │                  │  ├── ConnectionRegistry (links)  │
//!   │ ws       │ ◄─────────────── │  ├── PresenceDirectory           │
//!   └──────────┘   Envelope bytes │  ├── SessionStore (config + LWW) │
//!                                 │  └── ChatLog                     │
//!                                 └───────────────┬──────────────────┘
//!                                                 │ Notification
//!                                                 ▼
//!                                              observer
//! ```
//!
//! Every peer keeps its own replica. Local changes are broadcast once to
//! every open link; received changes are applied and never forwarded, so a
//! message travels exactly one hop. A newly linked peer is brought up to
//! date with a bootstrap snapshot sent over that link only.
//!
//! ## Modules
//!
//! - [`protocol`]: JSON envelopes, message kinds, duplicate suppression
//! - [`registry`]: one link per peer, lifecycle events, fan-out
//! - [`presence`]: peer id → profile directory
//! - [`session`]: session config, presets and the running game
//! - [`chat`]: append-only chat log
//! - [`peer`]: the dispatcher tying it all together
//! - [`transport`]: in-memory and WebSocket links

pub mod chat;
pub mod error;
pub mod peer;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use chat::{ChatEntry, ChatLog};
pub use error::SyncError;
pub use peer::{Notification, Peer, PeerConfig, RelayPolicy};
pub use presence::{Origin, PresenceDirectory, PresenceEntry, ProfileColor, UserProfile, PALETTE};
pub use protocol::{Envelope, MessageKind, Payload, PeerId};
pub use registry::{BroadcastStats, ConnectionRegistry, PendingConnect, RegistryEvent};
pub use session::{Preset, SessionConfig, SessionState, SessionStore, TimerConfig};
pub use transport::{
    Direction, LinkHandle, LinkId, LinkState, MemoryNetwork, MemoryTransport, Transport, TransportEvent, WsConfig,
    WsTransport,
};
