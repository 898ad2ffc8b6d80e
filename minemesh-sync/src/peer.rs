//! One peer: local operations, envelope routing and bootstrap.
//!
//! ```text
//!  local call ──► store mutation ──► Notification ──► observer
//!                        │
//!                        └──► Envelope ──► every open link
//!
//!  TransportEvent ──► registry ──► PeerJoined ──► bootstrap over that link
//!                 └─► Message ──► decode ──► sender check ──► dedup ──► store
//! ```
//!
//! A `Peer` is driven from a single task: every transport event and every
//! local call runs to completion before the next one starts, so no state is
//! shared and nothing is locked. Remote changes are applied and reported
//! but never forwarded.

use minemesh_board::{Board, BoardGenerator};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::chat::{ChatEntry, ChatLog};
use crate::error::SyncError;
use crate::presence::{PresenceDirectory, ProfileColor, UserProfile};
use crate::protocol::{
    now_millis, ChatText, Envelope, Payload, PeerId, SequenceTracker, SessionEnd, SessionStart, SessionUpdate,
};
use crate::registry::{BroadcastStats, ConnectionRegistry, PendingConnect, RegistryEvent};
use crate::session::{BoardApply, ConfigApply, SessionConfig, SessionState, SessionStore, SyncApply};
use crate::transport::{Transport, TransportEvent};

/// How far an envelope may travel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayPolicy {
    /// Envelopes are applied only when they come straight from their author
    #[default]
    DirectOnly,
}

/// Peer configuration.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Display name announced to other peers
    pub name: String,
    /// Profile color; picked from the palette by peer id when unset
    pub color: Option<ProfileColor>,
    pub relay: RelayPolicy,
    /// Config in place before anyone changes it
    pub session: SessionConfig,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            color: None,
            relay: RelayPolicy::DirectOnly,
            session: SessionConfig::default(),
        }
    }
}

/// Observer notifications, sent within the event that caused them.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    PresenceChanged(UserProfile),
    UserLeft(PeerId),
    ChatAppended(ChatEntry),
    ConfigChanged(SessionConfig),
    /// A peer sent a config while our session is active
    ConfigConflict { from: PeerId },
    SessionStarted(SessionState),
    SessionUpdated { timestamp: u64 },
    SessionEnded { reason: Option<String> },
    /// [`SyncError::ConnectFailed`] for a dial, [`SyncError::LinkFailed`]
    /// for an open link
    ConnectionError(SyncError),
}

pub struct Peer<T: Transport> {
    transport: T,
    relay: RelayPolicy,
    registry: ConnectionRegistry,
    directory: PresenceDirectory,
    session: SessionStore,
    chat: ChatLog,
    seen: SequenceTracker,
    sequence: u64,
    notify_tx: UnboundedSender<Notification>,
    notify_rx: Option<UnboundedReceiver<Notification>>,
}

impl<T: Transport> Peer<T> {
    /// Create a peer on top of `transport`. Fails if the initial session
    /// config is invalid.
    pub fn new(transport: T, config: PeerConfig) -> Result<Self, SyncError> {
        config.session.validate()?;

        let id = transport.local_id().clone();
        let color = config.color.unwrap_or_else(|| ProfileColor::from_peer_id(&id));
        let profile = UserProfile::new(id.clone(), config.name, color);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        log::info!("Peer {id} ready as '{}'", profile.name);

        Ok(Self {
            transport,
            relay: config.relay,
            registry: ConnectionRegistry::new(id),
            directory: PresenceDirectory::new(profile),
            session: SessionStore::new(config.session),
            chat: ChatLog::new(),
            seen: SequenceTracker::new(),
            sequence: 0,
            notify_tx,
            notify_rx: Some(notify_rx),
        })
    }

    pub fn id(&self) -> &PeerId {
        self.transport.local_id()
    }

    pub fn profile(&self) -> &UserProfile {
        self.directory.local()
    }

    /// Take the notification stream. Returns `None` after the first call.
    pub fn take_notifications(&mut self) -> Option<UnboundedReceiver<Notification>> {
        self.notify_rx.take()
    }

    pub fn directory(&self) -> &PresenceDirectory {
        &self.directory
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> BroadcastStats {
        self.registry.stats()
    }

    // ---- Connections ----

    /// Start dialing `peer`. Completion arrives later as
    /// [`Notification::PeerJoined`] or [`Notification::ConnectionError`].
    pub fn connect(&mut self, peer: &PeerId) -> Result<PendingConnect, SyncError> {
        if peer == self.id() {
            return Err(SyncError::SelfConnect);
        }
        let pending = self.registry.begin_connect(peer)?;
        log::info!("Connecting to {peer}");
        self.transport.open(peer);
        Ok(pending)
    }

    /// Close every link and abandon pending dials.
    pub fn disconnect_all(&mut self) {
        for event in self.registry.disconnect_all() {
            self.on_registry_event(event);
        }
    }

    // ---- Local operations ----

    /// Post a chat line and broadcast it.
    pub fn post(&mut self, text: impl Into<String>) -> ChatEntry {
        let id = self.id().clone();
        // History from an earlier run under the same id may hold our sequences
        if let Some(last) = self.chat.last_sequence(&id) {
            self.sequence = self.sequence.max(last);
        }
        let sequence = self.next_sequence();
        let timestamp = now_millis();
        let text = text.into();

        let entry = self.chat.push(id, sequence, text.clone(), timestamp).clone();
        self.notify(Notification::ChatAppended(entry.clone()));
        self.publish_as(sequence, Payload::Chat(ChatText { text, timestamp }));
        entry
    }

    /// Replace the session config. Rejected while a session is active.
    pub fn update_config(&mut self, config: SessionConfig) -> Result<(), SyncError> {
        self.session.update_config(config)?;
        log::info!("Session config set to {}x{} with {} bombs", config.width, config.height, config.bombs);
        self.notify(Notification::ConfigChanged(config));
        self.publish(Payload::ConfigUpdate(config));
        Ok(())
    }

    /// Start a session with an explicit initial board.
    pub fn start(&mut self, config: SessionConfig, board: Board) -> Result<SessionState, SyncError> {
        let timestamp = now_millis();
        let state = self.session.start(config, board.clone(), timestamp)?.clone();
        log::info!("Session started ({}x{}, {} bombs)", config.width, config.height, config.bombs);
        self.notify(Notification::SessionStarted(state.clone()));
        self.publish(Payload::SessionStart(SessionStart {
            config,
            board,
            timestamp,
        }));
        Ok(state)
    }

    /// Start a session with the current config, generating the board once.
    pub fn start_with(&mut self, generator: &dyn BoardGenerator) -> Result<SessionState, SyncError> {
        if self.session.is_active() {
            return Err(SyncError::AlreadyStarted);
        }
        let config = *self.session.config();
        config.validate()?;
        let board = generator
            .generate(config.width, config.height, config.bombs)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        self.start(config, board)
    }

    /// Replace the board. Returns the timestamp it was stamped with.
    pub fn update_board(&mut self, board: Board) -> Result<u64, SyncError> {
        let timestamp = self.session.update_board(board.clone(), now_millis())?;
        log::debug!("Board updated at {timestamp}");
        self.notify(Notification::SessionUpdated { timestamp });
        self.publish(Payload::SessionUpdate(SessionUpdate { board, timestamp }));
        Ok(timestamp)
    }

    /// End the session. Returns `false` (and sends nothing) if none was active.
    pub fn end(&mut self, reason: Option<String>) -> bool {
        if !self.session.end() {
            return false;
        }
        log::info!("Session ended{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default());
        self.notify(Notification::SessionEnded { reason: reason.clone() });
        self.publish(Payload::SessionEnd(SessionEnd { reason }));
        true
    }

    // ---- Event loop ----

    /// Drain every transport event that is ready. Returns how many ran.
    pub fn pump(&mut self, events: &mut UnboundedReceiver<TransportEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(link) | TransportEvent::Incoming(link) => {
                if let Some(event) = self.registry.link_up(link) {
                    self.on_registry_event(event);
                }
            }
            TransportEvent::ConnectFailed { peer, reason } => {
                if let Some(event) = self.registry.connect_failed(&peer, reason) {
                    self.on_registry_event(event);
                }
            }
            TransportEvent::Message { peer, link, bytes } => {
                if self.registry.link_id(&peer) != Some(link) {
                    log::debug!("Dropping frame from {peer} on stale {link}");
                    return;
                }
                self.receive(&peer, &bytes);
            }
            TransportEvent::Closed { peer, link } => {
                if let Some(event) = self.registry.link_down(&peer, link) {
                    self.on_registry_event(event);
                }
            }
            TransportEvent::Error { peer, link, reason } => {
                if self.registry.link_id(&peer) != Some(link) {
                    log::debug!("Ignoring error on stale {link} to {peer}: {reason}");
                    return;
                }
                log::error!("Link to {peer} failed: {reason}");
                self.notify(Notification::ConnectionError(SyncError::LinkFailed {
                    peer: peer.clone(),
                    reason,
                }));
                if let Some(event) = self.registry.link_down(&peer, link) {
                    self.on_registry_event(event);
                }
            }
        }
    }

    fn on_registry_event(&mut self, event: RegistryEvent) {
        match event {
            RegistryEvent::PeerJoined(peer) => {
                log::info!("Peer joined: {peer}");
                self.notify(Notification::PeerJoined(peer.clone()));
                self.bootstrap(&peer);
            }
            RegistryEvent::LinkReplaced(peer) => {
                log::debug!("Link to {peer} replaced, re-sending bootstrap");
                self.bootstrap(&peer);
            }
            RegistryEvent::PeerLeft(peer) => {
                log::info!("Peer left: {} ({peer})", self.directory.display_name(&peer));
                self.seen.forget(&peer);
                self.directory.remove(&peer);
                let relayed = self.directory.remove_learned_via(&peer);
                if !relayed.is_empty() {
                    log::debug!("Forgetting {} peer(s) learned via {peer}", relayed.len());
                }
                self.notify(Notification::PeerLeft(peer.clone()));
                self.notify(Notification::UserLeft(peer));
                for id in relayed {
                    self.notify(Notification::UserLeft(id));
                }
            }
            RegistryEvent::ConnectFailed { peer, reason } => {
                log::error!("Connection to {peer} failed: {reason}");
                self.notify(Notification::ConnectionError(SyncError::ConnectFailed { peer, reason }));
            }
        }
    }

    /// Snapshot for a freshly linked peer, sent over that link only.
    fn bootstrap(&mut self, peer: &PeerId) {
        self.send_to(peer, Payload::Profile(self.directory.local().clone()));

        let known = self.directory.snapshot_for(peer);
        if !known.is_empty() {
            self.send_to(peer, Payload::Directory(known));
        }
        if !self.chat.is_empty() {
            self.send_to(peer, Payload::ChatHistory(self.chat.entries().to_vec()));
        }
        self.send_to(peer, Payload::ConfigUpdate(*self.session.config()));
        if let Some(state) = self.session.state().cloned() {
            self.send_to(peer, Payload::SessionSync(state));
        }
    }

    fn receive(&mut self, link_peer: &PeerId, bytes: &[u8]) {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Discarding envelope from {link_peer}: {e}");
                return;
            }
        };

        match self.relay {
            RelayPolicy::DirectOnly if envelope.sender_id != *link_peer => {
                log::warn!(
                    "Dropping {} from {} relayed by {link_peer}",
                    envelope.kind(),
                    envelope.sender_id
                );
                return;
            }
            RelayPolicy::DirectOnly => {}
        }

        if !self.seen.observe(&envelope.sender_id, envelope.sequence) {
            log::warn!(
                "Duplicate {} #{} from {}",
                envelope.kind(),
                envelope.sequence,
                envelope.sender_id
            );
            return;
        }

        log::debug!("Applying {} #{} from {}", envelope.kind(), envelope.sequence, envelope.sender_id);
        self.dispatch(envelope);
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let from = envelope.sender_id;
        match envelope.payload {
            Payload::Profile(profile) => {
                if profile.id != from {
                    log::warn!("Ignoring profile for {} announced by {from}", profile.id);
                    return;
                }
                if self.directory.upsert(profile.clone()).changed() {
                    log::info!("{} is here", profile.name);
                    self.notify(Notification::PresenceChanged(profile));
                }
            }
            Payload::Directory(profiles) => {
                for profile in profiles {
                    if self.directory.learn(profile.clone(), &from).changed() {
                        self.notify(Notification::PresenceChanged(profile));
                    }
                }
            }
            Payload::ConfigUpdate(config) => match self.session.apply_config(config) {
                ConfigApply::Applied => self.notify(Notification::ConfigChanged(config)),
                ConfigApply::Unchanged => {}
                ConfigApply::Conflict => {
                    log::warn!("Config from {from} ignored: a session is active");
                    self.notify(Notification::ConfigConflict { from });
                }
            },
            Payload::SessionStart(start) => {
                if self.session.apply_start(start.config, start.board, start.timestamp) {
                    log::warn!("Session from {from} replaced the active session");
                }
                if let Some(state) = self.session.state() {
                    log::info!("Session started by {}", self.directory.display_name(&from));
                    let state = state.clone();
                    self.notify(Notification::SessionStarted(state));
                }
            }
            Payload::SessionUpdate(update) => match self.session.apply_update(update.board, update.timestamp) {
                BoardApply::Applied => self.notify(Notification::SessionUpdated {
                    timestamp: update.timestamp,
                }),
                BoardApply::Stale { stored } => {
                    log::warn!("Stale board from {from}: {} < {stored}", update.timestamp);
                }
                BoardApply::NoSession => {
                    log::warn!("Board from {from} with no active session");
                }
            },
            Payload::SessionSync(state) => match self.session.apply_sync(state.clone()) {
                SyncApply::Started => {
                    log::info!("Joined the session of {}", self.directory.display_name(&from));
                    self.notify(Notification::SessionStarted(state));
                }
                SyncApply::Restarted => {
                    log::warn!("Session snapshot from {from} replaced the active session");
                    self.notify(Notification::SessionStarted(state));
                }
                SyncApply::Updated => self.notify(Notification::SessionUpdated {
                    timestamp: state.last_update,
                }),
                SyncApply::Unchanged => log::debug!("Session snapshot from {from} matches ours"),
                SyncApply::Stale { stored } => {
                    log::debug!("Session snapshot from {from} is older than ours: {} < {stored}", state.last_update);
                }
            },
            Payload::SessionEnd(end) => {
                if self.session.apply_end() {
                    log::info!("Session ended by {}", self.directory.display_name(&from));
                    self.notify(Notification::SessionEnded { reason: end.reason });
                }
            }
            Payload::Chat(chat) => {
                if let Some(entry) = self.chat.append(from, envelope.sequence, chat.text, chat.timestamp) {
                    let entry = entry.clone();
                    self.notify(Notification::ChatAppended(entry));
                }
            }
            Payload::ChatHistory(history) => {
                for entry in self.chat.merge_history(history) {
                    self.notify(Notification::ChatAppended(entry));
                }
            }
        }
    }

    // ---- Outbound ----

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn publish(&mut self, payload: Payload) -> usize {
        let sequence = self.next_sequence();
        self.publish_as(sequence, payload)
    }

    fn publish_as(&mut self, sequence: u64, payload: Payload) -> usize {
        match Envelope::new(self.id().clone(), sequence, payload).encode() {
            Ok(bytes) => self.registry.broadcast(&bytes),
            Err(e) => {
                log::error!("Failed to encode envelope: {e}");
                0
            }
        }
    }

    fn send_to(&mut self, peer: &PeerId, payload: Payload) -> bool {
        let sequence = self.next_sequence();
        match Envelope::new(self.id().clone(), sequence, payload).encode() {
            Ok(bytes) => self.registry.send_to(peer, bytes),
            Err(e) => {
                log::error!("Failed to encode envelope for {peer}: {e}");
                false
            }
        }
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notify_tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LinkId, MemoryNetwork, MemoryTransport};
    use minemesh_board::RandomBoard;

    type Events = UnboundedReceiver<TransportEvent>;

    fn peer(net: &MemoryNetwork, id: &str, name: &str) -> (Peer<MemoryTransport>, Events) {
        let (transport, events) = net.join(id);
        let config = PeerConfig {
            name: name.to_string(),
            ..PeerConfig::default()
        };
        (Peer::new(transport, config).unwrap(), events)
    }

    fn settle(peers: &mut [(&mut Peer<MemoryTransport>, &mut Events)]) {
        loop {
            let mut handled = 0;
            for (peer, events) in peers.iter_mut() {
                handled += peer.pump(events);
            }
            if handled == 0 {
                break;
            }
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn board() -> Board {
        Board::with_bombs(9, 9, &[0, 1, 2]).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_session_config() {
        let net = MemoryNetwork::new();
        let (transport, _events) = net.join("a");
        let mut config = PeerConfig::default();
        config.session.bombs = 0;
        assert!(matches!(Peer::new(transport, config), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_profile_defaults_to_palette_color() {
        let net = MemoryNetwork::new();
        let (a, _events) = peer(&net, "a", "Alice");
        assert_eq!(a.profile().name, "Alice");
        assert_eq!(a.profile().color, ProfileColor::from_peer_id(&PeerId::from("a")));
    }

    #[test]
    fn test_take_notifications_once() {
        let net = MemoryNetwork::new();
        let (mut a, _events) = peer(&net, "a", "Alice");
        assert!(a.take_notifications().is_some());
        assert!(a.take_notifications().is_none());
    }

    #[test]
    fn test_connect_to_self_is_rejected() {
        let net = MemoryNetwork::new();
        let (mut a, _events) = peer(&net, "a", "Alice");
        assert_eq!(a.connect(&PeerId::from("a")), Err(SyncError::SelfConnect));
    }

    #[test]
    fn test_connect_exchanges_profiles() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_ev) = peer(&net, "a", "Alice");
        let (mut b, mut b_ev) = peer(&net, "b", "Bob");
        let mut a_notes = a.take_notifications().unwrap();

        a.connect(&PeerId::from("b")).unwrap();
        assert_eq!(a.connect(&PeerId::from("b")), Err(SyncError::AlreadyConnected(PeerId::from("b"))));
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);

        assert_eq!(a.directory().display_name(&PeerId::from("b")), "Bob");
        assert_eq!(b.directory().display_name(&PeerId::from("a")), "Alice");

        let notes = drain(&mut a_notes);
        assert_eq!(notes[0], Notification::PeerJoined(PeerId::from("b")));
        assert!(notes
            .iter()
            .any(|n| matches!(n, Notification::PresenceChanged(p) if p.name == "Bob")));
    }

    #[test]
    fn test_local_operations_notify() {
        let net = MemoryNetwork::new();
        let (mut a, _events) = peer(&net, "a", "Alice");
        let mut notes = a.take_notifications().unwrap();

        let entry = a.post("hello");
        assert_eq!(entry.sender, PeerId::from("a"));
        a.start_with(&RandomBoard::seeded(7)).unwrap();
        let stamp = a.update_board(board()).unwrap();
        assert!(a.end(Some("done".into())));
        assert!(!a.end(None));

        let notes = drain(&mut notes);
        assert_eq!(notes.len(), 4);
        assert!(matches!(&notes[0], Notification::ChatAppended(e) if e.text == "hello"));
        assert!(matches!(&notes[1], Notification::SessionStarted(s) if s.board.bomb_count() == 10));
        assert_eq!(notes[2], Notification::SessionUpdated { timestamp: stamp });
        assert_eq!(
            notes[3],
            Notification::SessionEnded {
                reason: Some("done".into())
            }
        );
    }

    #[test]
    fn test_start_with_calls_generator_once() {
        use std::cell::Cell;
        use minemesh_board::BoardError;

        let net = MemoryNetwork::new();
        let (mut a, _events) = peer(&net, "a", "Alice");
        let calls = Cell::new(0);
        let counting = |w: u32, h: u32, _bombs: u32| -> Result<Board, BoardError> {
            calls.set(calls.get() + 1);
            Board::with_bombs(w, h, &[0, 1])
        };

        a.start_with(&counting).unwrap();
        assert_eq!(a.start_with(&counting).unwrap_err(), SyncError::AlreadyStarted);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_relayed_envelope_is_dropped() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_ev) = peer(&net, "a", "Alice");
        let (mut b, mut b_ev) = peer(&net, "b", "Bob");
        a.connect(&PeerId::from("b")).unwrap();
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);

        let forged = Envelope::new(
            PeerId::from("carol"),
            1,
            Payload::Chat(ChatText {
                text: "via bob".into(),
                timestamp: 1,
            }),
        );
        let link = a.registry().link_id(&PeerId::from("b")).unwrap();
        a.handle_event(TransportEvent::Message {
            peer: PeerId::from("b"),
            link,
            bytes: forged.encode().unwrap(),
        });
        assert!(a.chat().is_empty());
    }

    #[test]
    fn test_frame_on_superseded_link_is_dropped() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_ev) = peer(&net, "a", "Alice");
        let (mut b, mut b_ev) = peer(&net, "b", "Bob");
        a.connect(&PeerId::from("b")).unwrap();
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);

        let current = a.registry().link_id(&PeerId::from("b")).unwrap();
        let chat = Envelope::new(
            PeerId::from("b"),
            1_000,
            Payload::Chat(ChatText {
                text: "late".into(),
                timestamp: 1,
            }),
        );
        a.handle_event(TransportEvent::Message {
            peer: PeerId::from("b"),
            link: LinkId(current.0 + 100),
            bytes: chat.encode().unwrap(),
        });
        assert!(a.chat().is_empty());

        // The same frame on the registered link still applies
        a.handle_event(TransportEvent::Message {
            peer: PeerId::from("b"),
            link: current,
            bytes: chat.encode().unwrap(),
        });
        assert_eq!(a.chat().texts(), vec!["late"]);
    }

    #[test]
    fn test_post_skips_sequences_from_an_earlier_run() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_ev) = peer(&net, "a", "Alice");
        let (mut b, mut b_ev) = peer(&net, "b", "Bob");
        a.connect(&PeerId::from("b")).unwrap();
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);

        let old = ChatEntry {
            sender: PeerId::from("a"),
            sequence: 40,
            text: "before restart".into(),
            timestamp: 1,
            receipt_order: 0,
        };
        let history = Envelope::new(PeerId::from("b"), 1_000, Payload::ChatHistory(vec![old]));
        let link = a.registry().link_id(&PeerId::from("b")).unwrap();
        a.handle_event(TransportEvent::Message {
            peer: PeerId::from("b"),
            link,
            bytes: history.encode().unwrap(),
        });

        let entry = a.post("after restart");
        assert!(entry.sequence > 40);
        assert_eq!(a.chat().texts(), vec!["before restart", "after restart"]);
        assert_eq!(a.chat().entries()[1], entry);
    }

    #[test]
    fn test_link_error_reports_and_removes_peer() {
        let net = MemoryNetwork::new();
        let (mut a, mut a_ev) = peer(&net, "a", "Alice");
        let (mut b, mut b_ev) = peer(&net, "b", "Bob");
        let mut notes = a.take_notifications().unwrap();
        a.connect(&PeerId::from("b")).unwrap();
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);
        drain(&mut notes);

        let link = a.registry().link_id(&PeerId::from("b")).unwrap();
        a.handle_event(TransportEvent::Error {
            peer: PeerId::from("b"),
            link,
            reason: "reset".into(),
        });

        assert_eq!(
            drain(&mut notes),
            vec![
                Notification::ConnectionError(SyncError::LinkFailed {
                    peer: PeerId::from("b"),
                    reason: "reset".into()
                }),
                Notification::PeerLeft(PeerId::from("b")),
                Notification::UserLeft(PeerId::from("b")),
            ]
        );
        assert!(!a.directory().contains(&PeerId::from("b")));

        // The close reaches bob too
        settle(&mut [(&mut a, &mut a_ev), (&mut b, &mut b_ev)]);
        assert!(!b.registry().is_open(&PeerId::from("a")));
    }
}
