//! Error taxonomy for the sync layer.
//!
//! Local operations return these synchronously and never leave state half
//! applied. Protocol errors come out of [`Envelope::decode`](crate::protocol::Envelope::decode)
//! and are logged and discarded by the dispatcher. Transport failures
//! (`ConnectFailed`, `LinkFailed`) reach observers inside
//! `Notification::ConnectionError`.

use thiserror::Error;

use crate::protocol::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("a link to {0} is already open or connecting")]
    AlreadyConnected(PeerId),
    #[error("cannot connect to own peer id")]
    SelfConnect,
    #[error("connection to {peer} failed: {reason}")]
    ConnectFailed { peer: PeerId, reason: String },
    #[error("link to {peer} failed: {reason}")]
    LinkFailed { peer: PeerId, reason: String },
    #[error("configuration cannot change while a session is active")]
    SessionActive,
    #[error("a session is already active")]
    AlreadyStarted,
    #[error("no active session")]
    NoActiveSession,
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unknown message kind `{0}`")]
    UnknownMessageKind(String),
}
