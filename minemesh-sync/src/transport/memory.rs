//! In-process transport over tokio unbounded channels.
//!
//! Every endpoint owns one event queue. Opening a link pushes `Incoming`
//! onto the target's queue and `Opened` onto ours in the same call, so
//! delivery order is fully deterministic: a test drains queues in whatever
//! order it likes and gets the same result every run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{Direction, LinkHandle, LinkId, LinkSink, Transport, TransportEvent};
use crate::protocol::PeerId;

type Endpoints = HashMap<PeerId, UnboundedSender<TransportEvent>>;

/// Registry of in-process endpoints.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<Endpoints>>,
    next_link: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint and return its transport and event queue.
    pub fn join(&self, id: impl Into<PeerId>) -> (MemoryTransport, UnboundedReceiver<TransportEvent>) {
        let id = id.into();
        let (events, rx) = mpsc::unbounded_channel();
        self.with_endpoints(|e| e.insert(id.clone(), events.clone()));
        let transport = MemoryTransport {
            id,
            events,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Unregister an endpoint; later dials to it fail.
    pub fn leave(&self, id: &PeerId) {
        self.with_endpoints(|e| e.remove(id));
    }

    fn endpoint(&self, id: &PeerId) -> Option<UnboundedSender<TransportEvent>> {
        self.with_endpoints(|e| e.get(id).cloned())
    }

    fn with_endpoints<R>(&self, f: impl FnOnce(&mut Endpoints) -> R) -> R {
        let mut guard = self.endpoints.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

pub struct MemoryTransport {
    id: PeerId,
    events: UnboundedSender<TransportEvent>,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    fn open(&self, target: &PeerId) {
        let fail = |reason: &str| {
            let _ = self.events.send(TransportEvent::ConnectFailed {
                peer: target.clone(),
                reason: reason.to_string(),
            });
        };

        let Some(remote) = self.network.endpoint(target) else {
            return fail("no such peer");
        };

        let link = LinkId(self.network.next_link.fetch_add(1, Ordering::Relaxed) + 1);
        let inbound = LinkHandle::new(
            self.id.clone(),
            link,
            Direction::Inbound,
            MemorySink::new(target.clone(), link, self.events.clone()),
        );
        if remote.send(TransportEvent::Incoming(inbound)).is_err() {
            return fail("peer is gone");
        }

        let outbound = LinkHandle::new(
            target.clone(),
            link,
            Direction::Outbound,
            MemorySink::new(self.id.clone(), link, remote),
        );
        let _ = self.events.send(TransportEvent::Opened(outbound));
    }
}

/// Pushes frames straight onto the remote endpoint's event queue.
struct MemorySink {
    /// Identity the remote sees as the sender
    from: PeerId,
    link: LinkId,
    to: UnboundedSender<TransportEvent>,
    closed: AtomicBool,
}

impl MemorySink {
    fn new(from: PeerId, link: LinkId, to: UnboundedSender<TransportEvent>) -> Self {
        Self {
            from,
            link,
            to,
            closed: AtomicBool::new(false),
        }
    }
}

impl LinkSink for MemorySink {
    fn send(&self, bytes: Vec<u8>) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        self.to
            .send(TransportEvent::Message {
                peer: self.from.clone(),
                link: self.link,
                bytes,
            })
            .is_ok()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            let _ = self.to.send(TransportEvent::Closed {
                peer: self.from.clone(),
                link: self.link,
            });
        }
    }
}
