//! Presence directory: who is in the game, by name and color.
//!
//! ## Entry origins
//!
//! ```text
//! Local    ── our own profile, created at setup, never removed
//! Direct   ── announced by its owner over a link (`profile` envelope)
//! Learned  ── second-hand, from another peer's `directory` bootstrap
//! ```
//!
//! A second-hand copy never overwrites a profile heard from its owner.
//! Learned entries give a name to peers we have no link to; they do not
//! make those peers reachable, and they go away with the peer that
//! relayed them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::PeerId;

/// Named display color (`value` is a CSS-style hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileColor {
    pub name: String,
    pub value: String,
}

/// Palette used when a user does not pick a color.
pub const PALETTE: [(&str, &str); 8] = [
    ("Red", "#e74c3c"),
    ("Blue", "#3498db"),
    ("Green", "#2ecc71"),
    ("Purple", "#9b59b6"),
    ("Orange", "#e67e22"),
    ("Teal", "#1abc9c"),
    ("Pink", "#fd79a8"),
    ("Yellow", "#f1c40f"),
];

impl ProfileColor {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Stable palette pick from a peer id.
    ///
    /// FNV-1a over the id bytes, so every peer computes the same color for
    /// the same id.
    pub fn from_peer_id(id: &PeerId) -> Self {
        let hash = id
            .as_str()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
            });
        let (name, value) = PALETTE[(hash % PALETTE.len() as u64) as usize];
        Self::new(name, value)
    }
}

/// A participant's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: PeerId,
    pub name: String,
    pub color: ProfileColor,
}

impl UserProfile {
    pub fn new(id: PeerId, name: impl Into<String>, color: ProfileColor) -> Self {
        Self {
            id,
            name: name.into(),
            color,
        }
    }
}

/// How a directory entry was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local,
    Direct,
    Learned { via: PeerId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub profile: UserProfile,
    pub origin: Origin,
}

impl PresenceEntry {
    pub fn is_self(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
    /// Rejected: would overwrite self or a first-hand profile
    Ignored,
}

impl Upsert {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

/// Peer id → profile map. Always contains the local profile.
#[derive(Debug, Clone)]
pub struct PresenceDirectory {
    local_id: PeerId,
    entries: HashMap<PeerId, PresenceEntry>,
}

impl PresenceDirectory {
    pub fn new(local: UserProfile) -> Self {
        let local_id = local.id.clone();
        let mut entries = HashMap::new();
        entries.insert(
            local_id.clone(),
            PresenceEntry {
                profile: local,
                origin: Origin::Local,
            },
        );
        Self { local_id, entries }
    }

    /// Our own profile.
    pub fn local(&self) -> &UserProfile {
        &self.entries[&self.local_id].profile
    }

    /// Upsert a profile announced by its owner.
    pub fn upsert(&mut self, profile: UserProfile) -> Upsert {
        if profile.id == self.local_id {
            return Upsert::Ignored;
        }
        let entry = PresenceEntry {
            profile,
            origin: Origin::Direct,
        };
        match self.entries.insert(entry.profile.id.clone(), entry.clone()) {
            None => Upsert::Inserted,
            Some(previous) if previous == entry => Upsert::Unchanged,
            Some(_) => Upsert::Updated,
        }
    }

    /// Record a second-hand profile relayed by `via` during bootstrap.
    pub fn learn(&mut self, profile: UserProfile, via: &PeerId) -> Upsert {
        let origin = Origin::Learned { via: via.clone() };
        let existing = self.entries.get(&profile.id).map(|e| {
            let second_hand = matches!(e.origin, Origin::Learned { .. });
            (second_hand, second_hand && e.profile == profile && e.origin == origin)
        });
        match existing {
            Some((false, _)) => return Upsert::Ignored,
            Some((true, true)) => return Upsert::Unchanged,
            _ => {}
        }
        self.entries
            .insert(profile.id.clone(), PresenceEntry { profile, origin });
        if existing.is_none() {
            Upsert::Inserted
        } else {
            Upsert::Updated
        }
    }

    /// Remove a peer. The local entry is never removed.
    pub fn remove(&mut self, id: &PeerId) -> Option<UserProfile> {
        if *id == self.local_id {
            return None;
        }
        self.entries.remove(id).map(|e| e.profile)
    }

    /// Drop every second-hand entry that `via` relayed. Returns their ids, sorted.
    pub fn remove_learned_via(&mut self, via: &PeerId) -> Vec<PeerId> {
        let mut removed: Vec<PeerId> = self
            .entries
            .values()
            .filter(|e| matches!(&e.origin, Origin::Learned { via: v } if v == via))
            .map(|e| e.profile.id.clone())
            .collect();
        removed.sort();
        for id in &removed {
            self.entries.remove(id);
        }
        removed
    }

    pub fn get(&self, id: &PeerId) -> Option<&PresenceEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.entries.contains_key(id)
    }

    /// Display name, falling back to `Unknown (<id>)`.
    pub fn display_name(&self, id: &PeerId) -> String {
        self.entries
            .get(id)
            .map(|e| e.profile.name.clone())
            .unwrap_or_else(|| format!("Unknown ({id})"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresenceEntry> {
        self.entries.values()
    }

    /// Remote profiles to hand a newly linked peer, excluding itself.
    pub fn snapshot_for(&self, recipient: &PeerId) -> Vec<UserProfile> {
        let mut profiles: Vec<UserProfile> = self
            .entries
            .values()
            .filter(|e| !e.is_self() && e.profile.id != *recipient)
            .map(|e| e.profile.clone())
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, name: &str) -> UserProfile {
        let id = PeerId::from(id);
        let color = ProfileColor::from_peer_id(&id);
        UserProfile::new(id, name, color)
    }

    #[test]
    fn test_directory_contains_self() {
        let dir = PresenceDirectory::new(profile("me", "Me"));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.local().name, "Me");
        assert!(dir.get(&PeerId::from("me")).unwrap().is_self());
    }

    #[test]
    fn test_self_is_never_removed_or_overwritten() {
        let mut dir = PresenceDirectory::new(profile("me", "Me"));
        assert_eq!(dir.upsert(profile("me", "Impostor")), Upsert::Ignored);
        assert_eq!(dir.learn(profile("me", "Impostor"), &PeerId::from("x")), Upsert::Ignored);
        assert!(dir.remove(&PeerId::from("me")).is_none());
        assert_eq!(dir.local().name, "Me");
    }

    #[test]
    fn test_upsert_reannouncement() {
        let mut dir = PresenceDirectory::new(profile("me", "Me"));
        assert_eq!(dir.upsert(profile("bob", "Bob")), Upsert::Inserted);
        assert_eq!(dir.upsert(profile("bob", "Bob")), Upsert::Unchanged);
        assert_eq!(dir.upsert(profile("bob", "Robert")), Upsert::Updated);
        assert_eq!(dir.display_name(&PeerId::from("bob")), "Robert");
    }

    #[test]
    fn test_learned_never_overrides_direct() {
        let mut dir = PresenceDirectory::new(profile("me", "Me"));
        let via = PeerId::from("bob");
        dir.upsert(profile("carol", "Carol"));

        assert_eq!(dir.learn(profile("carol", "Stale Carol"), &via), Upsert::Ignored);
        assert_eq!(dir.display_name(&PeerId::from("carol")), "Carol");

        // The owner announcing itself upgrades a learned entry
        assert_eq!(dir.learn(profile("dave", "Dave"), &via), Upsert::Inserted);
        assert_eq!(dir.upsert(profile("dave", "Dave")), Upsert::Updated);
        assert_eq!(dir.get(&PeerId::from("dave")).unwrap().origin, Origin::Direct);
    }

    #[test]
    fn test_learned_entries_leave_with_their_relay() {
        let mut dir = PresenceDirectory::new(profile("me", "Me"));
        let bob = PeerId::from("bob");
        dir.upsert(profile("bob", "Bob"));
        dir.upsert(profile("erin", "Erin"));
        dir.learn(profile("dave", "Dave"), &bob);
        dir.learn(profile("carol", "Carol"), &bob);
        dir.learn(profile("frank", "Frank"), &PeerId::from("erin"));

        assert_eq!(
            dir.remove_learned_via(&bob),
            vec![PeerId::from("carol"), PeerId::from("dave")]
        );
        assert!(dir.contains(&bob));
        assert!(dir.contains(&PeerId::from("frank")));
        assert_eq!(dir.len(), 4);
    }

    #[test]
    fn test_snapshot_excludes_self_and_recipient() {
        let mut dir = PresenceDirectory::new(profile("me", "Me"));
        dir.upsert(profile("bob", "Bob"));
        dir.upsert(profile("carol", "Carol"));

        let snapshot = dir.snapshot_for(&PeerId::from("bob"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Carol");
    }

    #[test]
    fn test_unknown_display_name() {
        let dir = PresenceDirectory::new(profile("me", "Me"));
        assert_eq!(dir.display_name(&PeerId::from("ghost")), "Unknown (ghost)");
    }

    #[test]
    fn test_color_is_stable_per_id() {
        let id = PeerId::from("ws://10.0.0.1:9000");
        assert_eq!(ProfileColor::from_peer_id(&id), ProfileColor::from_peer_id(&id));
        assert!(PALETTE.iter().any(|(n, _)| *n == ProfileColor::from_peer_id(&id).name));
    }
}
