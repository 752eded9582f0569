use crate::core::matchmaking::MatchmakingError;
use crate::models::{CharacterPair, Outcome};
use crate::services::{EntityStore, StoreError, TallyReceipt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Character ids already decided in the current round
#[derive(Debug, Default)]
pub struct VotedSet {
    ids: HashSet<String>,
}

impl VotedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// True when either member of the pair has been decided
    pub fn touches(&self, pair: &CharacterPair) -> bool {
        pair.ids().iter().any(|id| self.contains(id))
    }

    /// First of `ids` already decided, if any
    pub fn first_decided<'a>(&self, ids: &[&'a str]) -> Option<&'a str> {
        ids.iter().copied().find(|id| self.contains(id))
    }

    pub fn mark(&mut self, winner: &str, loser: &str) {
        self.ids.insert(winner.to_string());
        self.ids.insert(loser.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reject ballots with a missing or repeated id
pub fn validate_ballot(winner: &str, loser: &str) -> Result<(), MatchmakingError> {
    if winner.trim().is_empty() || loser.trim().is_empty() {
        return Err(MatchmakingError::InvalidVote(
            "Winner/Loser IDs are invalid or empty".to_string(),
        ));
    }
    if winner == loser {
        return Err(MatchmakingError::InvalidVote(
            "Winner and loser must be different characters".to_string(),
        ));
    }
    Ok(())
}

/// One accepted vote on its way to the entity store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub vote_id: Uuid,
    pub winner: String,
    pub loser: String,
}

impl Ballot {
    pub fn new(winner: impl Into<String>, loser: impl Into<String>) -> Self {
        Self {
            vote_id: Uuid::new_v4(),
            winner: winner.into(),
            loser: loser.into(),
        }
    }
}

/// How hard to push a tally increment through transient store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Applies accepted ballots to the entity store
///
/// Both increments are delivered concurrently and keyed by the ballot's vote
/// id, so a retry after a lost acknowledgement cannot count twice.
pub struct VoteGuard {
    store: Arc<dyn EntityStore>,
    retry: RetryPolicy,
}

impl VoteGuard {
    pub fn new(store: Arc<dyn EntityStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Deliver `winner.wins += 1` and `loser.losses += 1`
    pub async fn apply_tally(&self, ballot: &Ballot) -> Result<(), MatchmakingError> {
        let (winner, loser) = tokio::join!(
            self.deliver(ballot.vote_id, &ballot.winner, Outcome::Win),
            self.deliver(ballot.vote_id, &ballot.loser, Outcome::Loss),
        );

        let mut failed = Vec::new();
        for (id, result) in [(&ballot.winner, winner), (&ballot.loser, loser)] {
            match result {
                Ok(TallyReceipt::Applied) => {}
                Ok(TallyReceipt::Duplicate) => {
                    tracing::debug!("Increment for {} in vote {} already applied", id, ballot.vote_id);
                }
                Err(e) => {
                    tracing::error!("Failed to update tally of {} for vote {}: {}", id, ballot.vote_id, e);
                    failed.push(id.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MatchmakingError::PartialUpdateFailure { failed })
        }
    }

    async fn deliver(
        &self,
        vote_id: Uuid,
        id: &str,
        outcome: Outcome,
    ) -> Result<TallyReceipt, StoreError> {
        let mut attempt = 0;
        loop {
            match self.store.record_outcome(vote_id, id, outcome).await {
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    attempt += 1;
                    tracing::warn!(
                        "Retrying {} increment for {} (attempt {}): {}",
                        outcome.as_str(),
                        id,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}
