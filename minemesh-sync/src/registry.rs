//! Connection registry: the set of links, keyed by remote peer id, and the
//! fan-out over them.
//!
//! The registry turns raw transport outcomes into discrete lifecycle
//! events ([`RegistryEvent`]) and guarantees at most one open link per
//! peer. When both sides dial each other at once, the link dialed by the
//! lower peer id survives on both ends; the other is closed quietly.

use std::collections::HashMap;

use crate::error::SyncError;
use crate::protocol::PeerId;
use crate::transport::{Direction, LinkHandle, LinkId, LinkState};

/// Fan-out counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_links: usize,
}

/// Lifecycle changes produced by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    PeerJoined(PeerId),
    /// The peer stays joined but now talks over a different link
    LinkReplaced(PeerId),
    PeerLeft(PeerId),
    ConnectFailed { peer: PeerId, reason: String },
}

/// Returned by [`ConnectionRegistry::begin_connect`]; completion is
/// reported later as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnect {
    pub peer: PeerId,
}

enum Entry {
    Connecting,
    Open(LinkHandle),
}

pub struct ConnectionRegistry {
    local_id: PeerId,
    links: HashMap<PeerId, Entry>,
    messages_sent: u64,
    messages_dropped: u64,
}

impl ConnectionRegistry {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            links: HashMap::new(),
            messages_sent: 0,
            messages_dropped: 0,
        }
    }

    /// Reserve a connecting slot for `peer`.
    pub fn begin_connect(&mut self, peer: &PeerId) -> Result<PendingConnect, SyncError> {
        if self.links.contains_key(peer) {
            return Err(SyncError::AlreadyConnected(peer.clone()));
        }
        self.links.insert(peer.clone(), Entry::Connecting);
        Ok(PendingConnect { peer: peer.clone() })
    }

    /// A link finished its handshake, dialed by us or by the remote.
    pub fn link_up(&mut self, mut link: LinkHandle) -> Option<RegistryEvent> {
        let peer = link.peer().clone();
        match self.links.remove(&peer) {
            None if link.direction() == Direction::Outbound => {
                log::debug!("Dial to {peer} was abandoned, closing {}", link.id());
                link.close();
                None
            }
            None | Some(Entry::Connecting) => {
                self.links.insert(peer.clone(), Entry::Open(link));
                Some(RegistryEvent::PeerJoined(peer))
            }
            Some(Entry::Open(mut current)) => {
                if self.dialer(&link) <= self.dialer(&current) {
                    log::debug!("Replacing {} to {peer} with {}", current.id(), link.id());
                    current.close();
                    self.links.insert(peer.clone(), Entry::Open(link));
                    Some(RegistryEvent::LinkReplaced(peer))
                } else {
                    log::debug!("Keeping {} to {peer}, closing duplicate {}", current.id(), link.id());
                    link.close();
                    self.links.insert(peer, Entry::Open(current));
                    None
                }
            }
        }
    }

    /// A dial failed. Silent if the attempt was abandoned or superseded.
    pub fn connect_failed(&mut self, peer: &PeerId, reason: String) -> Option<RegistryEvent> {
        match self.links.get(peer) {
            Some(Entry::Connecting) => {
                self.links.remove(peer);
                Some(RegistryEvent::ConnectFailed {
                    peer: peer.clone(),
                    reason,
                })
            }
            _ => None,
        }
    }

    /// The transport reported `link` closed. Stale links are ignored.
    pub fn link_down(&mut self, peer: &PeerId, link: LinkId) -> Option<RegistryEvent> {
        if !matches!(self.links.get(peer), Some(Entry::Open(current)) if current.id() == link) {
            return None;
        }
        if let Some(Entry::Open(mut current)) = self.links.remove(peer) {
            current.close();
        }
        Some(RegistryEvent::PeerLeft(peer.clone()))
    }

    /// Close every link and abandon pending dials. Idempotent.
    pub fn disconnect_all(&mut self) -> Vec<RegistryEvent> {
        let mut left: Vec<PeerId> = Vec::new();
        for (peer, entry) in self.links.drain() {
            if let Entry::Open(mut link) = entry {
                link.close();
                left.push(peer);
            }
        }
        left.sort();
        left.into_iter().map(RegistryEvent::PeerLeft).collect()
    }

    /// Send to every open link. Returns the number of links written.
    pub fn broadcast(&mut self, bytes: &[u8]) -> usize {
        let mut sent = 0;
        for entry in self.links.values() {
            if let Entry::Open(link) = entry {
                if link.send(bytes.to_vec()) {
                    sent += 1;
                } else {
                    self.messages_dropped += 1;
                }
            }
        }
        self.messages_sent += 1;
        sent
    }

    /// Send to one open link.
    pub fn send_to(&mut self, peer: &PeerId, bytes: Vec<u8>) -> bool {
        let sent = matches!(self.links.get(peer), Some(Entry::Open(link)) if link.send(bytes));
        if sent {
            self.messages_sent += 1;
        } else {
            self.messages_dropped += 1;
        }
        sent
    }

    pub fn state(&self, peer: &PeerId) -> Option<LinkState> {
        self.links.get(peer).map(|e| match e {
            Entry::Connecting => LinkState::Connecting,
            Entry::Open(link) => link.state(),
        })
    }

    pub fn is_open(&self, peer: &PeerId) -> bool {
        self.state(peer) == Some(LinkState::Open)
    }

    pub fn link_id(&self, peer: &PeerId) -> Option<LinkId> {
        match self.links.get(peer) {
            Some(Entry::Open(link)) => Some(link.id()),
            _ => None,
        }
    }

    /// Peers with an open link, sorted.
    pub fn open_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .links
            .iter()
            .filter(|(_, e)| matches!(e, Entry::Open(_)))
            .map(|(p, _)| p.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
            active_links: self.open_peers().len(),
        }
    }

    fn dialer<'a>(&'a self, link: &'a LinkHandle) -> &'a PeerId {
        match link.direction() {
            Direction::Outbound => &self.local_id,
            Direction::Inbound => link.peer(),
        }
    }
}
