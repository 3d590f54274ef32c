//! Short numeric aliases for queued commands.
//!
//! Devices echo back whatever id they were handed in `C:<id>:<payload>`, and
//! many firmwares only accept small integers there. Commands keep their UUID
//! as the stable identity; the alias is a per-poll handle mapped back to it.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Maps `(device, alias)` to a command UUID.
pub trait AliasTable: Send + Sync {
    /// Remember that `alias` on `device_id` refers to `command_uuid` until `expires_at`.
    fn put(&self, device_id: i64, alias: u32, command_uuid: &str, expires_at: DateTime<Utc>);

    /// The command UUID behind an unexpired alias.
    fn resolve(&self, device_id: i64, alias: u32, now: DateTime<Utc>) -> Option<String>;

    /// Forget an alias.
    fn evict(&self, device_id: i64, alias: u32);

    /// Forget every alias that expired before `now`. Returns how many were dropped.
    fn evict_expired(&self, now: DateTime<Utc>) -> usize;
}

impl<T: AliasTable + ?Sized> AliasTable for std::sync::Arc<T> {
    fn put(&self, device_id: i64, alias: u32, command_uuid: &str, expires_at: DateTime<Utc>) {
        (**self).put(device_id, alias, command_uuid, expires_at)
    }

    fn resolve(&self, device_id: i64, alias: u32, now: DateTime<Utc>) -> Option<String> {
        (**self).resolve(device_id, alias, now)
    }

    fn evict(&self, device_id: i64, alias: u32) {
        (**self).evict(device_id, alias)
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        (**self).evict_expired(now)
    }
}

#[derive(Debug, Clone)]
struct AliasEntry {
    command_uuid: String,
    expires_at: DateTime<Utc>,
}

/// In-process alias table.
#[derive(Debug, Default)]
pub struct MemoryAliasTable {
    entries: DashMap<(i64, u32), AliasEntry>,
}

impl MemoryAliasTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AliasTable for MemoryAliasTable {
    fn put(&self, device_id: i64, alias: u32, command_uuid: &str, expires_at: DateTime<Utc>) {
        self.entries.insert(
            (device_id, alias),
            AliasEntry {
                command_uuid: command_uuid.to_string(),
                expires_at,
            },
        );
    }

    fn resolve(&self, device_id: i64, alias: u32, now: DateTime<Utc>) -> Option<String> {
        let key = (device_id, alias);
        let entry = self.entries.get(&key)?;
        if entry.expires_at < now {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.command_uuid.clone())
    }

    fn evict(&self, device_id: i64, alias: u32) {
        self.entries.remove(&(device_id, alias));
    }

    fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at >= now);
        before.saturating_sub(self.entries.len())
    }
}

/// Process-wide alias sequence. Never yields 0.
#[derive(Debug)]
pub struct AliasCounter(AtomicU32);

impl AliasCounter {
    /// Counter whose first alias is `start` (or 1 if `start` is 0).
    pub fn starting_at(start: u32) -> Self {
        Self(AtomicU32::new(start.max(1)))
    }

    /// Next alias.
    pub fn next(&self) -> u32 {
        loop {
            let alias = self.0.fetch_add(1, Ordering::Relaxed);
            if alias != 0 {
                return alias;
            }
        }
    }
}

impl Default for AliasCounter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}
