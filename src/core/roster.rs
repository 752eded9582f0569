use crate::models::CharacterPair;
use crate::services::{EntityStore, StoreError};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shuffled character ids for one round
///
/// The order is the pairing order: offset `n` pairs `ids[n]` with `ids[n + 1]`.
/// Snapshots are never mutated, a refresh builds a new one with a higher
/// generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterSnapshot {
    generation: u64,
    ids: Vec<String>,
}

impl RosterSnapshot {
    pub fn new(generation: u64, ids: Vec<String>) -> Self {
        Self { generation, ids }
    }

    /// The generation-0 snapshot a fresh process starts with
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The pair starting at `offset`, if both members fit inside the snapshot
    pub fn pair_at(&self, offset: usize) -> Option<CharacterPair> {
        match self.ids.get(offset..offset.checked_add(2)?) {
            Some([first, second]) => Some(CharacterPair::new(first.clone(), second.clone())),
            _ => None,
        }
    }
}

/// The active roster snapshot and the means to rebuild it
pub struct RosterCache {
    store: Arc<dyn EntityStore>,
    current: RwLock<Arc<RosterSnapshot>>,
    generation: AtomicU64,
}

impl RosterCache {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(RosterSnapshot::empty())),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn current(&self) -> Arc<RosterSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Pull every id from the store, shuffle, and make it the active snapshot
    ///
    /// On a store failure the previous snapshot stays active.
    pub async fn refresh(&self) -> Result<Arc<RosterSnapshot>, StoreError> {
        let mut ids = self.store.list_ids().await?;
        ids.shuffle(&mut rand::thread_rng());

        let snapshot = Arc::new(RosterSnapshot::new(self.next_generation(), ids));
        *self.current.write().await = Arc::clone(&snapshot);

        tracing::info!(
            "Roster refreshed: generation {} with {} characters",
            snapshot.generation(),
            snapshot.len()
        );

        Ok(snapshot)
    }

    /// Reshuffle the active snapshot under a new generation
    ///
    /// Used to start a new round when the store cannot be reached.
    pub async fn reshuffle_current(&self) -> Arc<RosterSnapshot> {
        let mut current = self.current.write().await;

        let mut ids = current.ids().to_vec();
        ids.shuffle(&mut rand::thread_rng());

        let snapshot = Arc::new(RosterSnapshot::new(self.next_generation(), ids));
        *current = Arc::clone(&snapshot);

        tracing::warn!(
            "Roster reshuffled from stale snapshot: generation {} with {} characters",
            snapshot.generation(),
            snapshot.len()
        );

        snapshot
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}
