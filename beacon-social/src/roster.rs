//! Roster of participants currently believed online.
//!
//! The roster is a presence snapshot, not a directory: an identity enters on
//! its first observed beacon and leaves entirely when it goes offline.
//! Profiles are kept in lockstep with roster entries.
//!
//! ```text
//! beacon(id, online) ──► RosterStore::apply_presence()
//!                              │
//!                              ├─ new id or status flip ──► SocialEvent::ClientState
//!                              ├─ first sighting        ──► SocialEvent::UserProfile
//!                              └─ offline               ──► record + profile dropped
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::{Identity, Timestamp};
use crate::event::SocialEvent;

/// Liveness of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn from_online(is_online: bool) -> Self {
        if is_online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

/// Roster entry (client state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub identity: Identity,
    pub status: PresenceStatus,
    /// When this participant first entered the roster.
    pub last_updated: Timestamp,
    /// When a beacon from this participant was last processed.
    pub last_seen: Timestamp,
}

impl ParticipantRecord {
    pub fn online(identity: Identity, last_updated: Timestamp, last_seen: Timestamp) -> Self {
        Self {
            identity,
            status: PresenceStatus::Online,
            last_updated,
            last_seen,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}

/// Profile card for a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: Identity,
    pub display_name: String,
    pub last_updated: Timestamp,
}

/// Result of a single [`RosterStore::apply_presence`] call.
#[derive(Debug, Clone)]
pub struct PresenceOutcome {
    /// Post-state of the participant.
    pub record: ParticipantRecord,
    /// Notifications raised by the change, in emission order.
    pub events: Vec<SocialEvent>,
}

/// Owns roster and profile maps.
#[derive(Debug, Default, Clone)]
pub struct RosterStore {
    clients: HashMap<Identity, ParticipantRecord>,
    users: HashMap<Identity, UserProfile>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a liveness signal for `identity`.
    ///
    /// A `ClientState` notification is raised only when the identity is new
    /// to the roster or its stored status differs, so repeated online
    /// beacons stay silent.
    pub fn apply_presence(
        &mut self,
        identity: &Identity,
        is_online: bool,
        now: Timestamp,
    ) -> PresenceOutcome {
        let new_status = PresenceStatus::from_online(is_online);
        let previous = self.clients.get(identity);

        let record = ParticipantRecord {
            identity: identity.clone(),
            status: new_status,
            last_updated: previous.map_or(now, |p| p.last_updated),
            last_seen: now,
        };

        let mut events = Vec::new();
        if previous.map_or(true, |p| p.status != new_status) {
            events.push(SocialEvent::ClientState(record.clone()));
        }

        if is_online {
            self.clients.insert(identity.clone(), record.clone());
            if !self.users.contains_key(identity) {
                let profile = UserProfile {
                    identity: identity.clone(),
                    display_name: identity.to_string(),
                    last_updated: now,
                };
                log::debug!("Discovered participant {identity}");
                events.push(SocialEvent::UserProfile(profile.clone()));
                self.users.insert(identity.clone(), profile);
            }
        } else {
            self.clients.remove(identity);
            self.users.remove(identity);
        }

        PresenceOutcome { record, events }
    }

    /// Roster entry for `identity`, if online.
    pub fn client(&self, identity: &str) -> Option<&ParticipantRecord> {
        self.clients.get(identity)
    }

    /// Profile for `identity`, if known.
    pub fn profile(&self, identity: &str) -> Option<&UserProfile> {
        self.users.get(identity)
    }

    /// Whether `identity` is a roster or profile key (valid send target).
    pub fn contains(&self, identity: &str) -> bool {
        self.clients.contains_key(identity) || self.users.contains_key(identity)
    }

    /// Snapshot of the roster.
    pub fn clients(&self) -> HashMap<Identity, ParticipantRecord> {
        self.clients.clone()
    }

    /// Snapshot of the profiles.
    pub fn users(&self) -> HashMap<Identity, UserProfile> {
        self.users.clone()
    }

    /// Number of online participants.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn id(s: &str) -> Identity {
        Identity::from(s)
    }

    fn client_state_count(events: &[SocialEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SocialEvent::ClientState(_)))
            .count()
    }

    fn keys_match(store: &RosterStore) -> bool {
        let clients: HashSet<_> = store.clients.keys().collect();
        let users: HashSet<_> = store.users.keys().collect();
        clients == users
    }

    #[test]
    fn test_first_beacon_creates_record_and_profile() {
        let mut store = RosterStore::new();
        let out = store.apply_presence(&id("U.a"), true, 100);

        assert_eq!(out.record.status, PresenceStatus::Online);
        assert_eq!(out.record.last_updated, 100);
        assert_eq!(out.record.last_seen, 100);
        assert_eq!(out.events.len(), 2);
        assert!(matches!(&out.events[0], SocialEvent::ClientState(r) if r.identity == id("U.a")));
        match &out.events[1] {
            SocialEvent::UserProfile(p) => {
                assert_eq!(p.display_name, "U.a");
                assert_eq!(p.last_updated, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(store.len(), 1);
        assert!(store.profile("U.a").is_some());
    }

    #[test]
    fn test_repeated_online_beacon_is_silent() {
        let mut store = RosterStore::new();
        store.apply_presence(&id("U.a"), true, 100);

        let out = store.apply_presence(&id("U.a"), true, 200);
        assert!(out.events.is_empty());
        // lastUpdated survives, lastSeen moves.
        assert_eq!(out.record.last_updated, 100);
        assert_eq!(out.record.last_seen, 200);
        assert_eq!(store.client("U.a").unwrap().last_seen, 200);
    }

    #[test]
    fn test_status_flip_emits_exactly_once() {
        let mut store = RosterStore::new();
        store.apply_presence(&id("U.a"), true, 1);

        let out = store.apply_presence(&id("U.a"), false, 2);
        assert_eq!(client_state_count(&out.events), 1);
        assert_eq!(out.record.status, PresenceStatus::Offline);
        assert!(store.client("U.a").is_none());
        assert!(store.profile("U.a").is_none());

        // Back online: treated as new again, profile rediscovered.
        let out = store.apply_presence(&id("U.a"), true, 3);
        assert_eq!(client_state_count(&out.events), 1);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.record.last_updated, 3);
    }

    #[test]
    fn test_offline_for_unknown_identity_still_notifies() {
        let mut store = RosterStore::new();
        let out = store.apply_presence(&id("U.ghost"), false, 5);
        assert_eq!(out.events.len(), 1);
        assert!(matches!(&out.events[0], SocialEvent::ClientState(r) if !r.is_online()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_profile_keys_track_roster_keys() {
        let mut store = RosterStore::new();
        let script = [
            ("U.a", true),
            ("U.b", true),
            ("U.a", true),
            ("U.c", false),
            ("U.b", false),
            ("U.a", false),
            ("U.a", false),
            ("U.c", true),
            ("U.b", true),
        ];
        for (t, (who, online)) in script.iter().enumerate() {
            store.apply_presence(&id(who), *online, t as Timestamp);
            assert!(keys_match(&store), "diverged after step {t}");
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_contains_checks_both_maps() {
        let mut store = RosterStore::new();
        store.apply_presence(&id("U.a"), true, 1);
        assert!(store.contains("U.a"));
        assert!(!store.contains("U.b"));
    }

    #[test]
    fn test_snapshots_are_copies() {
        let mut store = RosterStore::new();
        store.apply_presence(&id("U.a"), true, 1);
        let snapshot = store.clients();
        store.apply_presence(&id("U.a"), false, 2);
        assert_eq!(snapshot.len(), 1);
        assert!(store.clients().is_empty());
        assert!(store.users().is_empty());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(PresenceStatus::Online.as_str(), "ONLINE");
        assert_eq!(PresenceStatus::Offline.as_str(), "OFFLINE");
        assert_eq!(PresenceStatus::from_online(false), PresenceStatus::Offline);
    }
}
