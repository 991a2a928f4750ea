//! Session-scoped metrics cache
//!
//! Each entry maps a `(source, version)` key to a materialized table. Entries
//! are owned by the identity they were built for: row links embed that
//! identity, so a change of viewer empties the cache before the next read.
//!
//! Per key the lifecycle is `Empty -> Loading -> Populated`, falling back to
//! `Empty` when a load fails (failures are never cached). Concurrent requests
//! for a key that is loading wait for the in-flight load instead of issuing a
//! second fetch. Every slot records the cache generation it was created in;
//! invalidation bumps the generation and drops the slots, so a load that
//! finishes afterwards lands in an orphaned slot and never becomes visible.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::{PortalError, Result};
use crate::metrics::{CACHE_INVALIDATIONS, CACHE_LOOKUPS};
use crate::schema::Source;
use crate::session::Identity;
use crate::table::MetricsTable;

/// Label of a data snapshot for a source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VersionKey(String);

impl VersionKey {
    pub const CURRENT: &'static str = "current";

    /// Accepts `[A-Za-z0-9_.-]+`, excluding `.` and `..`.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(PortalError::InvalidRequest(format!(
                "Invalid version key: {:?}",
                raw
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VersionKey {
    fn default() -> Self {
        Self(Self::CURRENT.to_string())
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one materialized table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub source: Source,
    pub version: VersionKey,
}

impl CacheKey {
    pub fn new(source: Source, version: VersionKey) -> Self {
        Self { source, version }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.version)
    }
}

/// Produces a table for a key on cache miss
#[async_trait]
pub trait TableLoader: Send + Sync {
    async fn load(&self, key: &CacheKey, identity: &Identity) -> Result<MetricsTable>;
}

/// Why entries were dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    IdentityChanged,
    ForcedReload,
}

impl InvalidationReason {
    fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::IdentityChanged => "identity_changed",
            InvalidationReason::ForcedReload => "forced_reload",
        }
    }
}

struct Slot {
    generation: u64,
    cell: Arc<OnceCell<Arc<MetricsTable>>>,
}

#[derive(Default)]
struct CacheState {
    owner: Option<String>,
    generation: u64,
    slots: HashMap<CacheKey, Slot>,
}

impl CacheState {
    fn clear(&mut self, reason: InvalidationReason) {
        self.generation += 1;
        let dropped = self.slots.len();
        self.slots.clear();
        CACHE_INVALIDATIONS.with_label_values(&[reason.as_str()]).inc();
        info!(
            reason = reason.as_str(),
            dropped,
            generation = self.generation,
            "Metrics cache invalidated"
        );
    }
}

/// Per-session table cache
#[derive(Default)]
pub struct MetricsCache {
    state: Mutex<CacheState>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    // The lock is never held across an await
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached table for `key`, loading it through `loader` on miss.
    ///
    /// If `identity` differs from the identity the current entries were built
    /// for, every entry is dropped first.
    pub async fn get<L>(
        &self,
        key: &CacheKey,
        identity: &Identity,
        loader: &L,
    ) -> Result<Arc<MetricsTable>>
    where
        L: TableLoader + ?Sized,
    {
        let (cell, generation) = {
            let mut state = self.lock();
            if state.owner.as_deref() != Some(identity.name()) {
                if state.owner.is_some() {
                    state.clear(InvalidationReason::IdentityChanged);
                }
                state.owner = Some(identity.name().to_string());
            }
            let generation = state.generation;
            let slot = state.slots.entry(key.clone()).or_insert_with(|| Slot {
                generation,
                cell: Arc::new(OnceCell::new()),
            });
            (slot.cell.clone(), slot.generation)
        };

        if let Some(table) = cell.get() {
            CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
            debug!(%key, "Metrics cache hit");
            return Ok(table.clone());
        }

        let loaded = AtomicBool::new(false);
        let flag = &loaded;
        let result = cell
            .get_or_try_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                debug!(%key, identity = %identity.name(), "Metrics cache miss, loading");
                loader.load(key, identity).await.map(Arc::new)
            })
            .await;
        let table = match result {
            Ok(table) => table.clone(),
            Err(e) => {
                self.discard_empty(key, &cell);
                return Err(e);
            }
        };

        let loaded_here = loaded.load(Ordering::Relaxed);
        let outcome = if loaded_here { "miss" } else { "coalesced" };
        CACHE_LOOKUPS.with_label_values(&[outcome]).inc();

        if loaded_here {
            let state = self.lock();
            let current = state.slots.get(key).map(|slot| slot.generation);
            if current != Some(generation) {
                debug!(%key, generation, "Load finished after invalidation, result not cached");
            }
        }

        Ok(table)
    }

    // Back to Empty: a failed key leaves nothing behind
    fn discard_empty(&self, key: &CacheKey, cell: &Arc<OnceCell<Arc<MetricsTable>>>) {
        let mut state = self.lock();
        let ours = state
            .slots
            .get(key)
            .map_or(false, |slot| Arc::ptr_eq(&slot.cell, cell) && !cell.initialized());
        if ours {
            state.slots.remove(key);
        }
    }

    /// Switch the owning identity, dropping all entries if it changed.
    ///
    /// Returns whether anything was invalidated.
    pub fn set_owner(&self, identity: &Identity) -> bool {
        let mut state = self.lock();
        let changed = state.owner.as_deref().map(|owner| owner != identity.name());
        match changed {
            Some(false) => false,
            Some(true) => {
                state.clear(InvalidationReason::IdentityChanged);
                state.owner = Some(identity.name().to_string());
                true
            }
            None => {
                state.owner = Some(identity.name().to_string());
                false
            }
        }
    }

    /// Drop one key so the next read refetches it.
    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        let mut state = self.lock();
        state.generation += 1;
        let removed = state.slots.remove(key).is_some();
        CACHE_INVALIDATIONS
            .with_label_values(&[InvalidationReason::ForcedReload.as_str()])
            .inc();
        info!(%key, removed, "Metrics cache entry invalidated");
        removed
    }

    #[cfg(test)]
    /// Drop every entry.
    pub fn invalidate_all(&self, reason: InvalidationReason) {
        self.lock().clear(reason);
    }

    /// Whether `key` currently holds a populated table.
    #[cfg(test)]
    pub fn is_cached(&self, key: &CacheKey) -> bool {
        self.lock()
            .slots
            .get(key)
            .map(|slot| slot.cell.initialized())
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }
}
