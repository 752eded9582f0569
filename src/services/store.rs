use crate::models::{Character, CharacterQuery, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when talking to the entity store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::SqlxError(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::MigrateError(_) | StoreError::NotFound(_) => false,
        }
    }
}

/// Result of delivering one tally increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyReceipt {
    /// The counter moved
    Applied,
    /// This vote id already moved this counter, nothing changed
    Duplicate,
}

/// Durable record storage for characters and their tallies
///
/// Counter updates must be atomic increments on the store side. They are keyed
/// by the vote id so that redelivering the same increment is a no-op.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every character id, in no particular order
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn find(&self, id: &str) -> Result<Option<Character>, StoreError>;

    /// Characters with the given ids; missing ids are skipped
    async fn find_many(&self, ids: &[String]) -> Result<Vec<Character>, StoreError>;

    async fn list(&self, query: &CharacterQuery) -> Result<Vec<Character>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Add a character, returning false if its id is already taken
    ///
    /// An existing character is left untouched.
    async fn create(&self, character: Character) -> Result<bool, StoreError>;

    /// Add one win or loss for `id`, once per `vote_id`
    ///
    /// Fails with `NotFound` when the character no longer exists.
    async fn record_outcome(
        &self,
        vote_id: Uuid,
        id: &str,
        outcome: Outcome,
    ) -> Result<TallyReceipt, StoreError>;

    /// Bump the report counter, returning the updated character
    async fn increment_reports(&self, id: &str) -> Result<Option<Character>, StoreError>;

    /// Remove a character, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Drop tally receipts recorded before `cutoff`
    async fn prune_receipts(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}
