//! Entity registry: the authoritative table of known sessions.

use indexmap::IndexMap;

use crate::types::Session;

/// Outcome of [`EntityRegistry::upsert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// The id was not known; a new entry was added.
    Inserted,
    /// The id was known; non-empty fields were merged in.
    Merged,
}

impl Upsert {
    /// Whether a new entry was added.
    pub fn is_new(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// In-memory table of sessions keyed by id, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    sessions: IndexMap<String, Session>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session or merge into the existing entry.
    ///
    /// Merging never blanks a known field (see [`Session::merge_from`]).
    pub fn upsert(&mut self, session: Session) -> Upsert {
        if let Some(existing) = self.sessions.get_mut(&session.id) {
            let _ = existing.merge_from(&session);
            return Upsert::Merged;
        }
        let _ = self.sessions.insert(session.id.clone(), session);
        Upsert::Inserted
    }

    /// Remove a session. Returns it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.shift_remove(id)
    }

    /// Remove every session. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.sessions.len();
        self.sessions.clear();
        removed
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are known.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate sessions in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
