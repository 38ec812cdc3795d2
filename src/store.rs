//! The idle/active connection bookkeeping the pool consults on every
//! acquire and release.
//!
//! Grounded on `httpcore.connection_pool.ConnectionStore`: an `all` map for
//! O(1) membership/length checks plus a `by_origin` map so acquiring a
//! connection for a given origin doesn't have to scan every held
//! connection.

use std::collections::HashMap;
use std::time::Instant;

use crate::origin::Origin;

struct Entry<C> {
    origin: Origin,
    conn: C,
    inserted_at: Instant,
}

/// A set of connections, indexed both overall and per-origin.
///
/// `order` tracks ids in insertion order, independent of `entries`'s
/// `HashMap` order, so `iter()` can walk the store the way
/// `httpcore.connection_pool.ConnectionStore.__iter__` walks its backing
/// dict (whose iteration order is insertion order, same as every Python
/// dict since 3.7) -- something a plain `HashMap` can't give us on its own.
pub(crate) struct ConnectionStore<C> {
    entries: HashMap<u64, Entry<C>>,
    by_origin: HashMap<Origin, Vec<u64>>,
    order: Vec<u64>,
    next_id: u64,
}

impl<C> ConnectionStore<C> {
    pub(crate) fn new() -> ConnectionStore<C> {
        ConnectionStore {
            entries: HashMap::new(),
            by_origin: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
        }
    }

    /// Adds a connection under `origin`, returning the id it can later be
    /// `remove`d by.
    pub(crate) fn add(&mut self, origin: Origin, conn: C) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.by_origin.entry(origin.clone()).or_default().push(id);
        self.order.push(id);
        self.entries.insert(
            id,
            Entry {
                origin,
                conn,
                inserted_at: Instant::now(),
            },
        );
        id
    }

    /// Removes a connection by id, returning it if it was still present.
    pub(crate) fn remove(&mut self, id: u64) -> Option<C> {
        let entry = self.entries.remove(&id)?;
        if let Some(ids) = self.by_origin.get_mut(&entry.origin) {
            ids.retain(|&existing| existing != id);
            if ids.is_empty() {
                self.by_origin.remove(&entry.origin);
            }
        }
        self.order.retain(|&existing| existing != id);
        Some(entry.conn)
    }

    /// Pops the most recently inserted connection for `origin`, if any,
    /// along with how long it had been sitting in the store.
    ///
    /// LIFO per origin (`Vec::pop`), so a hot connection is reused first
    /// instead of round-robining through every idle connection.
    pub(crate) fn pop_most_recent_for(
        &mut self,
        origin: &Origin,
    ) -> Option<(u64, C, std::time::Duration)> {
        let id = self.by_origin.get_mut(origin).and_then(Vec::pop)?;
        if self
            .by_origin
            .get(origin)
            .map_or(false, |ids| ids.is_empty())
        {
            self.by_origin.remove(origin);
        }
        self.order.retain(|&existing| existing != id);
        let entry = self.entries.remove(&id)?;
        Some((id, entry.conn, entry.inserted_at.elapsed()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over every held connection in insertion order, oldest
    /// first, without removing anything -- the fourth operation spec's
    /// §4.C names alongside `add`/`remove`/`pop_most_recent_for`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Origin, &C)> {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|e| (&e.origin, &e.conn)))
    }

    /// Removes and returns every held connection, in insertion order.
    ///
    /// Used when the pool is closed and every idle connection needs to be
    /// shut down.
    pub(crate) fn drain(&mut self) -> Vec<C> {
        self.by_origin.clear();
        let mut entries = std::mem::take(&mut self.entries);
        self.order
            .drain(..)
            .filter_map(|id| entries.remove(&id).map(|e| e.conn))
            .collect()
    }
}
