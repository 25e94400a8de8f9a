//! Connection membership bookkeeping.
//!
//! The registry only tracks who is connected and which audience they are in.
//! It never writes to a connection except to close it on deregister, and that
//! close happens after the membership lock has been released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mockwire_core::ConnectionId;
use parking_lot::RwLock;
use tracing::debug;

use super::connection::{Connection, Membership};

#[derive(Default)]
struct Members {
    global: HashMap<ConnectionId, Arc<Connection>>,
    audiences: HashMap<String, HashSet<ConnectionId>>,
}

impl Members {
    /// Drop `id` from whatever audience holds it, deleting the audience if it
    /// becomes empty. Returns the label it was removed from.
    fn remove_from_audience(&mut self, id: ConnectionId) -> Option<String> {
        let label = self
            .audiences
            .iter()
            .find(|(_, set)| set.contains(&id))
            .map(|(label, _)| label.clone())?;
        if let Some(set) = self.audiences.get_mut(&label) {
            let _ = set.remove(&id);
            if set.is_empty() {
                let _ = self.audiences.remove(&label);
            }
        }
        Some(label)
    }
}

/// Point-in-time list of recipients for one fan-out.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    members: Vec<Arc<Connection>>,
}

impl Snapshot {
    /// Recipients, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.members.iter()
    }

    /// Number of recipients.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there is nobody to deliver to.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ids of every recipient.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|c| c.id()).collect()
    }
}

/// Global connection set plus audience map, behind one lock.
///
/// The lock is a `parking_lot` lock; its guards are not `Send`, so no caller
/// can hold one across an `.await`.
pub struct ConnectionRegistry {
    name: &'static str,
    members: RwLock<Members>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = self.members.read();
        f.debug_struct("ConnectionRegistry")
            .field("name", &self.name)
            .field("connections", &members.global.len())
            .field("audiences", &members.audiences.len())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Empty registry; `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: RwLock::new(Members::default()),
        }
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Add to the global set. No-op if already present.
    pub fn register(&self, conn: &Arc<Connection>) {
        let mut members = self.members.write();
        if members.global.contains_key(&conn.id()) {
            return;
        }
        let _ = members.global.insert(conn.id(), Arc::clone(conn));
        conn.set_membership(Membership::Global);
        debug!(registry = self.name, conn_id = %conn.id(), total = members.global.len(), "registered");
    }

    /// Put `conn` in `audience`, creating it if needed.
    ///
    /// A connection is in at most one audience; joining moves it out of any
    /// previous one. Joining also registers `conn`, so every audience member
    /// shows up in snapshots and is closed by [`deregister`](Self::deregister).
    pub fn join(&self, conn: &Arc<Connection>, audience: &str) {
        let mut members = self.members.write();
        let id = conn.id();
        if !members.global.contains_key(&id) {
            let _ = members.global.insert(id, Arc::clone(conn));
            debug!(registry = self.name, conn_id = %id, "registered on join");
        }
        if members
            .audiences
            .get(audience)
            .is_some_and(|set| set.contains(&id))
        {
            return;
        }
        let _ = members.remove_from_audience(id);
        let _ = members
            .audiences
            .entry(audience.to_owned())
            .or_default()
            .insert(id);
        conn.set_membership(Membership::Audience(audience.to_owned()));
        debug!(registry = self.name, conn_id = %id, room = audience, "joined audience");
    }

    /// Take `conn` out of `audience`; the audience is deleted once empty.
    pub fn leave(&self, conn: &Arc<Connection>, audience: &str) {
        let mut members = self.members.write();
        let id = conn.id();
        let Some(set) = members.audiences.get_mut(audience) else {
            return;
        };
        if !set.remove(&id) {
            return;
        }
        if set.is_empty() {
            let _ = members.audiences.remove(audience);
            debug!(registry = self.name, room = audience, "audience emptied");
        }
        let next = if members.global.contains_key(&id) {
            Membership::Global
        } else {
            Membership::None
        };
        conn.set_membership(next);
        debug!(registry = self.name, conn_id = %id, room = audience, "left audience");
    }

    /// Remove `conn` from the registry and close its transport. No-op if it
    /// was never registered.
    pub async fn deregister(&self, conn: &Arc<Connection>) {
        let removed = {
            let mut members = self.members.write();
            let id = conn.id();
            let removed = members.global.remove(&id);
            if removed.is_some() {
                let _ = members.remove_from_audience(id);
            }
            removed
        };
        let Some(conn) = removed else {
            return;
        };
        conn.set_membership(Membership::None);
        debug!(registry = self.name, conn_id = %conn.id(), "deregistered");
        conn.close().await;
    }

    /// Members of `audience`, or the global set for `None`.
    ///
    /// A missing audience yields an empty snapshot.
    pub fn snapshot(&self, audience: Option<&str>) -> Snapshot {
        let members = self.members.read();
        let list = match audience {
            None => members.global.values().cloned().collect(),
            Some(label) => members
                .audiences
                .get(label)
                .map(|set| {
                    set.iter()
                        .filter_map(|id| members.global.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default(),
        };
        Snapshot { members: list }
    }

    /// Registered connections.
    pub fn len(&self) -> usize {
        self.members.read().global.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.members.read().global.is_empty()
    }

    /// Audiences with at least one member.
    pub fn audience_count(&self) -> usize {
        self.members.read().audiences.len()
    }

    /// Whether `audience` currently exists.
    pub fn has_audience(&self, audience: &str) -> bool {
        self.members.read().audiences.contains_key(audience)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().global.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::*;
    use crate::websocket::transport::memory::{MemorySink, SinkLog, SinkMode};

    fn conn() -> (Arc<Connection>, SinkLog) {
        let (sink, log) = MemorySink::new(SinkMode::Accept);
        (Arc::new(Connection::new(sink, Duration::from_secs(10))), log)
    }

    fn ids(snapshot: &Snapshot) -> BTreeSet<ConnectionId> {
        snapshot.ids().into_iter().collect()
    }

    #[test]
    fn register_is_idempotent() {
        let reg = ConnectionRegistry::new("test");
        let (c, _) = conn();
        reg.register(&c);
        reg.register(&c);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.snapshot(None).len(), 1);
        assert_eq!(c.membership(), Membership::Global);
    }

    #[test]
    fn first_join_creates_audience() {
        let reg = ConnectionRegistry::new("test");
        let (c, _) = conn();
        reg.register(&c);
        assert!(!reg.has_audience("r"));
        reg.join(&c, "r");
        assert!(reg.has_audience("r"));
        assert_eq!(reg.snapshot(Some("r")).ids(), vec![c.id()]);
        assert_eq!(c.membership(), Membership::Audience("r".into()));
    }

    #[test]
    fn last_leave_deletes_audience() {
        let reg = ConnectionRegistry::new("test");
        let (a, _) = conn();
        let (b, _) = conn();
        for c in [&a, &b] {
            reg.register(c);
            reg.join(c, "r");
        }
        reg.leave(&a, "r");
        assert!(reg.has_audience("r"));
        reg.leave(&b, "r");
        assert!(!reg.has_audience("r"));
        assert_eq!(reg.audience_count(), 0);
        assert!(reg.snapshot(Some("r")).is_empty());
        assert_eq!(b.membership(), Membership::Global);
    }

    #[test]
    fn snapshot_of_unknown_audience_is_empty() {
        let reg = ConnectionRegistry::new("test");
        assert!(reg.snapshot(Some("nowhere")).is_empty());
    }

    #[test]
    fn leave_of_non_member_is_noop() {
        let reg = ConnectionRegistry::new("test");
        let (a, _) = conn();
        let (b, _) = conn();
        reg.register(&a);
        reg.register(&b);
        reg.join(&a, "r");
        reg.leave(&b, "r");
        reg.leave(&a, "other");
        assert_eq!(reg.snapshot(Some("r")).ids(), vec![a.id()]);
    }

    #[test]
    fn join_moves_between_audiences() {
        let reg = ConnectionRegistry::new("test");
        let (c, _) = conn();
        reg.register(&c);
        reg.join(&c, "a");
        reg.join(&c, "b");
        assert!(!reg.has_audience("a"));
        assert_eq!(reg.snapshot(Some("b")).ids(), vec![c.id()]);
    }

    #[test]
    fn audiences_are_isolated() {
        let reg = ConnectionRegistry::new("test");
        let (a, _) = conn();
        let (b, _) = conn();
        let (c, _) = conn();
        for (conn, room) in [(&a, "room1"), (&b, "room1"), (&c, "room2")] {
            reg.register(conn);
            reg.join(conn, room);
        }
        assert_eq!(
            ids(&reg.snapshot(Some("room1"))),
            [a.id(), b.id()].into_iter().collect()
        );
        assert_eq!(reg.snapshot(Some("room2")).ids(), vec![c.id()]);
        assert_eq!(reg.snapshot(None).len(), 3);
    }

    #[tokio::test]
    async fn deregister_removes_and_closes() {
        let reg = ConnectionRegistry::new("test");
        let (c, log) = conn();
        reg.register(&c);
        reg.join(&c, "r");
        reg.deregister(&c).await;
        assert!(!reg.contains(c.id()));
        assert!(!reg.has_audience("r"));
        assert!(c.is_closed());
        assert!(log.is_closed());
        assert_eq!(c.membership(), Membership::None);
    }

    #[tokio::test]
    async fn join_without_register_is_tracked_and_cleaned_up() {
        let reg = ConnectionRegistry::new("test");
        let (c, log) = conn();
        reg.join(&c, "r");
        assert!(reg.contains(c.id()));
        assert_eq!(reg.snapshot(Some("r")).ids(), vec![c.id()]);

        reg.deregister(&c).await;
        assert!(!reg.has_audience("r"));
        assert!(reg.snapshot(Some("r")).is_empty());
        assert!(reg.is_empty());
        assert!(c.is_closed());
        assert!(log.is_closed());
    }

    #[test]
    fn leave_after_bare_join_keeps_registration() {
        let reg = ConnectionRegistry::new("test");
        let (c, _) = conn();
        reg.join(&c, "r");
        reg.leave(&c, "r");
        assert!(!reg.has_audience("r"));
        assert!(reg.contains(c.id()));
        assert_eq!(c.membership(), Membership::Global);
    }

    #[tokio::test]
    async fn deregister_unknown_is_noop() {
        let reg = ConnectionRegistry::new("test");
        let (c, log) = conn();
        reg.deregister(&c).await;
        assert!(!c.is_closed());
        assert!(!log.is_closed());
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let reg = ConnectionRegistry::new("test");
        let (a, _) = conn();
        let (b, _) = conn();
        reg.register(&a);
        let snap = reg.snapshot(None);
        reg.register(&b);
        assert_eq!(snap.ids(), vec![a.id()]);
        assert_eq!(reg.snapshot(None).len(), 2);
    }

    #[test]
    fn concurrent_membership_changes_leave_no_empty_audiences() {
        let reg = Arc::new(ConnectionRegistry::new("test"));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let (c, _) = conn();
                        let room = format!("r{}", (t + i) % 3);
                        reg.register(&c);
                        reg.join(&c, &room);
                        let snap = reg.snapshot(Some(&room));
                        assert_eq!(
                            snap.ids().iter().collect::<BTreeSet<_>>().len(),
                            snap.len()
                        );
                        reg.leave(&c, &room);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.audience_count(), 0);
        assert_eq!(reg.len(), 1600);
    }
}
