//! Transport seam: turns a peer id into an open, ordered byte link.
//!
//! A transport never calls into peer state. Everything it observes (dial
//! outcome, accepted links, frames, closes) is pushed as a
//! [`TransportEvent`] onto a channel that the owning [`Peer`](crate::Peer)
//! drains one event at a time.
//!
//! ```text
//! Transport::open(target) ──► Opened(link) | ConnectFailed
//! listener accept         ──► Incoming(link)
//! remote frame            ──► Message { peer, link, bytes }
//! remote close / error    ──► Closed | Error
//! ```

pub mod memory;
pub mod ws;

use std::fmt;

use crate::protocol::PeerId;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use ws::{WsConfig, WsTransport};

/// Opens links on behalf of one local peer.
pub trait Transport {
    /// Identifier this transport assigned to the local peer.
    fn local_id(&self) -> &PeerId;

    /// Start dialing `target`. Never blocks; the outcome arrives as
    /// [`TransportEvent::Opened`] or [`TransportEvent::ConnectFailed`].
    fn open(&self, target: &PeerId);
}

/// Write half of a link.
pub trait LinkSink: Send {
    /// Queue a frame. Returns `false` if the link is gone.
    fn send(&self, bytes: Vec<u8>) -> bool;

    /// Close the link. The remote side observes a close.
    fn close(&self);
}

/// Unique per transport instance; distinguishes successive links to the
/// same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Who dialed a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Link lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
}

/// An open link to one remote peer.
pub struct LinkHandle {
    peer: PeerId,
    id: LinkId,
    direction: Direction,
    state: LinkState,
    sink: Box<dyn LinkSink>,
}

impl LinkHandle {
    pub fn new(peer: PeerId, id: LinkId, direction: Direction, sink: impl LinkSink + 'static) -> Self {
        Self {
            peer,
            id,
            direction,
            state: LinkState::Open,
            sink: Box::new(sink),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.state == LinkState::Open && self.sink.send(bytes)
    }

    /// Close the link. Idempotent.
    pub fn close(&mut self) {
        if self.state != LinkState::Closed {
            self.state = LinkState::Closed;
            self.sink.close();
        }
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("peer", &self.peer)
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("state", &self.state)
            .finish()
    }
}

/// Everything a transport reports to its peer.
#[derive(Debug)]
pub enum TransportEvent {
    /// A dial we started completed its handshake
    Opened(LinkHandle),
    /// A remote peer dialed us
    Incoming(LinkHandle),
    ConnectFailed { peer: PeerId, reason: String },
    Message { peer: PeerId, link: LinkId, bytes: Vec<u8> },
    Closed { peer: PeerId, link: LinkId },
    Error { peer: PeerId, link: LinkId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct CountingSink {
        sent: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl LinkSink for CountingSink {
        fn send(&self, _bytes: Vec<u8>) -> bool {
            self.sent.fetch_add(1, Ordering::Relaxed);
            true
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_closed_link_is_terminal() {
        let sink = CountingSink::default();
        let mut link = LinkHandle::new(PeerId::from("bob"), LinkId(1), Direction::Outbound, sink.clone());

        assert_eq!(link.state(), LinkState::Open);
        assert!(link.send(vec![1]));

        link.close();
        link.close();
        assert_eq!(link.state(), LinkState::Closed);
        assert!(!link.send(vec![2]));
        assert_eq!(sink.sent.load(Ordering::Relaxed), 1);
        assert_eq!(sink.closed.load(Ordering::Relaxed), 1);
    }
}
