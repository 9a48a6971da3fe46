//! Process-wide keyed cache of shared stages.
//!
//! The cache guarantees at most one live stage per [`StageKey`]: two
//! callers resolving the same key concurrently serialize on that key's
//! slot, the first one opens the stage and the rest reuse it. Other keys
//! are not blocked.
//!
//! Entries are weak. A shared stage lives as long as some node holds it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::{InitialLoadSet, Stage, StageHandle};
use crate::util::Result;

/// Identifier of a stage in the cache. `-1` is invalid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageCacheId(i64);

impl StageCacheId {
    pub const INVALID: Self = Self(-1);

    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn to_i64(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for StageCacheId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for StageCacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageCacheId({})", self.0)
    }
}

/// What makes two shared stages the same stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub root_layer: String,
    pub session_layer: Option<String>,
    pub load_set: InitialLoadSet,
}

impl StageKey {
    pub fn new(root_layer: impl Into<String>, session_layer: Option<String>, load_set: InitialLoadSet) -> Self {
        Self { root_layer: root_layer.into(), session_layer, load_set }
    }
}

struct Entry {
    stage: Weak<Stage>,
    key: Option<StageKey>,
}

/// Keyed cache of shared stages.
pub struct StageCache {
    slots: Mutex<HashMap<StageKey, Arc<Mutex<Weak<Stage>>>>>,
    entries: Mutex<HashMap<StageCacheId, Entry>>,
    by_stage: Mutex<HashMap<u64, StageCacheId>>,
    next_id: AtomicI64,
}

impl StageCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            by_stage: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(0),
        }
    }

    /// The process-wide cache, created on first use.
    pub fn global() -> &'static StageCache {
        static CACHE: OnceLock<StageCache> = OnceLock::new();
        CACHE.get_or_init(StageCache::new)
    }

    /// Return the live stage for `key`, or open one with `open`.
    ///
    /// `open` runs at most once per key at a time; a failed open leaves
    /// the slot empty so a later call can retry. Entries of dropped stages
    /// are pruned first.
    pub fn find_or_open<F>(&self, key: StageKey, open: F) -> Result<(StageHandle, StageCacheId)>
    where
        F: FnOnce() -> Result<StageHandle>,
    {
        self.prune();
        loop {
            let slot = self.slots.lock().entry(key.clone()).or_default().clone();
            let mut current = slot.lock();
            // Pruned between the lookup and the lock: start over on the
            // slot now in the map.
            let mapped = self.slots.lock().get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot));
            if !mapped {
                continue;
            }
            if let Some(stage) = current.upgrade() {
                let id = self.insert_keyed(&stage, Some(key));
                return Ok((stage, id));
            }
            let stage = open()?;
            *current = Arc::downgrade(&stage);
            let id = self.insert_keyed(&stage, Some(key));
            tracing::debug!(cache_id = id.to_i64(), stage = stage.id(), "stage cached");
            return Ok((stage, id));
        }
    }

    /// Live stage for `key`, if any.
    pub fn find_by_key(&self, key: &StageKey) -> Option<StageHandle> {
        let slot = self.slots.lock().get(key).cloned()?;
        let stage = slot.lock().upgrade();
        stage
    }

    /// Add a stage, returning its id. A stage already present keeps its id.
    pub fn insert(&self, stage: &StageHandle) -> StageCacheId {
        self.prune();
        self.insert_keyed(stage, None)
    }

    fn insert_keyed(&self, stage: &StageHandle, key: Option<StageKey>) -> StageCacheId {
        let mut by_stage = self.by_stage.lock();
        if let Some(id) = by_stage.get(&stage.id()) {
            return *id;
        }
        let id = StageCacheId(self.next_id.fetch_add(1, Ordering::Relaxed));
        by_stage.insert(stage.id(), id);
        self.entries.lock().insert(id, Entry { stage: Arc::downgrade(stage), key });
        id
    }

    /// Live stage with `id`.
    pub fn find(&self, id: StageCacheId) -> Option<StageHandle> {
        if !id.is_valid() {
            return None;
        }
        self.entries.lock().get(&id).and_then(|e| e.stage.upgrade())
    }

    /// Id of `stage`, or [`StageCacheId::INVALID`] if it is not cached.
    pub fn id_of(&self, stage: &Stage) -> StageCacheId {
        let id = self.by_stage.lock().get(&stage.id()).copied();
        match id {
            Some(id) if self.find(id).is_some() => id,
            _ => StageCacheId::INVALID,
        }
    }

    pub fn contains(&self, stage: &Stage) -> bool {
        self.id_of(stage).is_valid()
    }

    /// Drop an entry. Returns false if the id was unknown.
    pub fn erase(&self, id: StageCacheId) -> bool {
        let Some(entry) = self.entries.lock().remove(&id) else {
            return false;
        };
        self.by_stage.lock().retain(|_, v| *v != id);
        if let Some(key) = entry.key {
            let mut slots = self.slots.lock();
            // A slot locked by an open in progress, or holding a newer
            // stage for the same key, stays.
            let stale = slots.get(&key).is_some_and(|slot| {
                slot.try_lock()
                    .is_some_and(|current| current.strong_count() == 0 || Weak::ptr_eq(&current, &entry.stage))
            });
            if stale {
                slots.remove(&key);
            }
        }
        true
    }

    /// Remove the entries and slots of stages that no longer exist.
    fn prune(&self) {
        let dead: Vec<StageCacheId> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| e.stage.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.erase(*id);
        }
        // Slots left empty by failed opens have no entry to erase.
        self.slots
            .lock()
            .retain(|_, slot| slot.try_lock().map_or(true, |current| current.strong_count() > 0));
        if !dead.is_empty() {
            tracing::trace!(count = dead.len(), "pruned dead stage cache entries");
        }
    }

    /// Number of live stages. Dead entries are pruned.
    pub fn len(&self) -> usize {
        self.prune();
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every entry.
    pub fn clear(&self) {
        self.slots.lock().clear();
        self.entries.lock().clear();
        self.by_stage.lock().clear();
    }
}

impl Default for StageCache {
    fn default() -> Self {
        Self::new()
    }
}
