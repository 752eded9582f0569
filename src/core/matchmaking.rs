use crate::core::guard::{validate_ballot, Ballot, RetryPolicy, VoteGuard, VotedSet};
use crate::core::nonce::{NonceBinding, NonceLedger};
use crate::core::roster::{RosterCache, RosterSnapshot};
use crate::core::stickiness::StickinessTable;
use crate::models::{Character, CharacterPair, VisitorId};
use crate::services::{EntityStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors surfaced by the matchmaking engine
#[derive(Debug, Error)]
pub enum MatchmakingError {
    #[error("Not enough characters to form a pair ({available} available)")]
    InsufficientRoster { available: usize },

    #[error("Nonce is unknown, expired or already used")]
    NonceMismatch,

    #[error("Vote does not match the pair issued with this nonce")]
    PairMismatch,

    #[error("Character {0} has already been voted on this round")]
    AlreadyVoted(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Entity store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Tally update failed for {failed:?}")]
    PartialUpdateFailure { failed: Vec<String> },
}

impl From<StoreError> for MatchmakingError {
    fn from(e: StoreError) -> Self {
        MatchmakingError::StoreUnavailable(e.to_string())
    }
}

/// Tunables for the matchmaking engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchmakingOptions {
    pub max_outstanding_nonces: usize,
    pub max_hydration_attempts: usize,
    pub tally_retry: RetryPolicy,
}

impl Default for MatchmakingOptions {
    fn default() -> Self {
        Self {
            max_outstanding_nonces: 100_000,
            max_hydration_attempts: 5,
            tally_retry: RetryPolicy::default(),
        }
    }
}

/// A pair handed to a visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedPair {
    pub nonce: String,
    pub pair: CharacterPair,
    pub offset: usize,
    /// True when this repeats the visitor's un-voted pair
    pub reissued: bool,
}

/// An issued pair with both characters loaded
#[derive(Debug, Clone)]
pub struct Matchup {
    pub nonce: String,
    pub characters: [Character; 2],
}

/// Outcome of an accepted vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub vote_id: Uuid,
    pub winner: String,
    pub loser: String,
}

enum Issuance {
    Issued(IssuedPair),
    Exhausted,
}

/// Everything that lives and dies with one roster snapshot
#[derive(Debug)]
struct Round {
    snapshot: Arc<RosterSnapshot>,
    cursor: usize,
    stickiness: StickinessTable,
    nonces: NonceLedger,
    voted: VotedSet,
}

impl Round {
    fn new(snapshot: Arc<RosterSnapshot>, nonce_capacity: usize) -> Self {
        Self {
            snapshot,
            cursor: 0,
            stickiness: StickinessTable::new(),
            nonces: NonceLedger::with_capacity(nonce_capacity),
            voted: VotedSet::new(),
        }
    }

    fn id(&self) -> u64 {
        self.snapshot.generation()
    }

    fn issue(&mut self, visitor: &VisitorId) -> Issuance {
        if let Some(entry) = self.stickiness.remove(visitor) {
            // The old nonce dies whether or not the pair is reissued
            self.nonces.revoke(&entry.nonce);

            if let Some(pair) = self.snapshot.pair_at(entry.offset) {
                if entry.offset < self.cursor && !self.voted.touches(&pair) {
                    let nonce = self.nonces.issue(visitor.clone(), pair.clone(), entry.offset);
                    self.stickiness.record(visitor.clone(), entry.offset, nonce.clone());
                    return Issuance::Issued(IssuedPair {
                        nonce,
                        pair,
                        offset: entry.offset,
                        reissued: true,
                    });
                }
            }
        }

        let offset = self.cursor;
        let Some(pair) = self.snapshot.pair_at(offset) else {
            return Issuance::Exhausted;
        };

        let nonce = self.nonces.issue(visitor.clone(), pair.clone(), offset);
        self.stickiness.record(visitor.clone(), offset, nonce.clone());
        self.cursor += 2;

        Issuance::Issued(IssuedPair {
            nonce,
            pair,
            offset,
            reissued: false,
        })
    }

    /// Steps 2-5 and 7 of a vote, all under the round lock
    fn accept_vote(
        &mut self,
        winner: &str,
        loser: &str,
        nonce: &str,
    ) -> Result<NonceBinding, MatchmakingError> {
        let binding = self
            .nonces
            .consume(nonce)
            .ok_or(MatchmakingError::NonceMismatch)?;

        if !binding.pair.is_decided_by(winner, loser) {
            return Err(MatchmakingError::PairMismatch);
        }

        if let Some(id) = self.voted.first_decided(&[winner, loser]) {
            return Err(MatchmakingError::AlreadyVoted(id.to_string()));
        }

        self.voted.mark(winner, loser);
        self.stickiness.release(&binding.visitor, binding.offset);

        Ok(binding)
    }

    /// Give up on an issued pair that can no longer be shown
    fn abandon(&mut self, visitor: &VisitorId, issued: &IssuedPair) {
        self.nonces.revoke(&issued.nonce);
        if self
            .stickiness
            .get(visitor)
            .is_some_and(|entry| entry.nonce == issued.nonce)
        {
            self.stickiness.remove(visitor);
        }
    }
}

/// Point-in-time view of the round, for logs and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundStatus {
    pub round_id: u64,
    pub roster_len: usize,
    pub cursor: usize,
    pub visitors: usize,
    pub outstanding_nonces: usize,
    pub voted: usize,
}

/// Hands out character pairs and accepts votes on them
///
/// All round state sits behind one lock that is never held across an entity
/// store call. Roster refreshes are serialized by a second lock so that only
/// one request rebuilds the roster when a round runs out.
pub struct MatchmakingService {
    store: Arc<dyn EntityStore>,
    roster: RosterCache,
    round: Mutex<Round>,
    refresh_gate: Mutex<()>,
    guard: VoteGuard,
    options: MatchmakingOptions,
}

impl MatchmakingService {
    pub fn new(store: Arc<dyn EntityStore>, options: MatchmakingOptions) -> Self {
        Self {
            roster: RosterCache::new(Arc::clone(&store)),
            round: Mutex::new(Round::new(
                Arc::new(RosterSnapshot::empty()),
                options.max_outstanding_nonces,
            )),
            refresh_gate: Mutex::new(()),
            guard: VoteGuard::new(Arc::clone(&store), options.tally_retry),
            store,
            options,
        }
    }

    pub fn roster(&self) -> &RosterCache {
        &self.roster
    }

    /// Load the first roster eagerly instead of on the first request
    pub async fn warm_up(&self) -> Result<(), MatchmakingError> {
        let current = self.round.lock().await.id();
        self.begin_next_round(current, None).await.map(|_| ())
    }

    pub async fn status(&self) -> RoundStatus {
        let round = self.round.lock().await;
        RoundStatus {
            round_id: round.id(),
            roster_len: round.snapshot.len(),
            cursor: round.cursor,
            visitors: round.stickiness.len(),
            outstanding_nonces: round.nonces.outstanding(),
            voted: round.voted.len(),
        }
    }

    /// Next pair for `visitor`, or the same pair again if they have not voted on it
    pub async fn next_pair(&self, visitor: &VisitorId) -> Result<IssuedPair, MatchmakingError> {
        let exhausted_round = {
            let mut round = self.round.lock().await;
            match round.issue(visitor) {
                Issuance::Issued(issued) => {
                    log_issued(visitor, &issued, round.id());
                    return Ok(issued);
                }
                Issuance::Exhausted => round.id(),
            }
        };

        match self.begin_next_round(exhausted_round, Some(visitor)).await? {
            Some(issued) => Ok(issued),
            None => {
                let available = self.round.lock().await.snapshot.len();
                Err(MatchmakingError::InsufficientRoster { available })
            }
        }
    }

    /// `next_pair` with both characters loaded from the store
    ///
    /// A pair whose member was deleted since the roster refresh is abandoned
    /// and the following pair is tried instead.
    pub async fn next_matchup(&self, visitor: &VisitorId) -> Result<Matchup, MatchmakingError> {
        for _ in 0..self.options.max_hydration_attempts.max(1) {
            let issued = self.next_pair(visitor).await?;
            let ids: Vec<String> = issued.pair.ids().iter().map(|id| id.to_string()).collect();
            let mut found = self.store.find_many(&ids).await?;

            let first = take_by_id(&mut found, &issued.pair.first);
            let second = take_by_id(&mut found, &issued.pair.second);
            if let (Some(first), Some(second)) = (first, second) {
                return Ok(Matchup {
                    nonce: issued.nonce,
                    characters: [first, second],
                });
            }

            tracing::warn!("Pair {} has a deleted member, skipping it", issued.pair);
            self.round.lock().await.abandon(visitor, &issued);
        }

        Err(MatchmakingError::StoreUnavailable(format!(
            "{} consecutive pairs had deleted members",
            self.options.max_hydration_attempts.max(1)
        )))
    }

    /// Accept a vote and apply it to the tallies
    ///
    /// Local round state is committed before the store is touched. A failure
    /// while applying the tally leaves the ballot marked as voted.
    pub async fn record_vote(
        &self,
        winner: &str,
        loser: &str,
        nonce: &str,
        visitor: &VisitorId,
    ) -> Result<VoteReceipt, MatchmakingError> {
        validate_ballot(winner, loser)?;

        let accepted = self.round.lock().await.accept_vote(winner, loser, nonce);
        let binding = match accepted {
            Ok(binding) => binding,
            Err(e) => {
                tracing::info!("Rejected vote from {}: {}", visitor, e);
                return Err(e);
            }
        };

        if binding.visitor != *visitor {
            tracing::debug!(
                "Nonce issued to {} was used by {}",
                binding.visitor,
                visitor
            );
        }

        let ballot = Ballot::new(winner, loser);
        self.guard.apply_tally(&ballot).await?;

        tracing::info!(
            "+1 ▴ {} / +1 ▾ {} from {} (vote {})",
            winner,
            loser,
            visitor,
            ballot.vote_id
        );

        Ok(VoteReceipt {
            vote_id: ballot.vote_id,
            winner: ballot.winner,
            loser: ballot.loser,
        })
    }

    /// Replace the round identified by `exhausted_round` with a fresh one
    ///
    /// When `visitor` is given, their pair is issued under the same lock that
    /// installs the new round, so a request that waited on the refresh never
    /// loses the fresh pairs to requests that did not. If another request
    /// replaced the round in the meantime, the visitor is served from it, and a
    /// replacement that is already exhausted is rebuilt here while the gate is
    /// still held. The result is `None` only without a visitor.
    async fn begin_next_round(
        &self,
        exhausted_round: u64,
        visitor: Option<&VisitorId>,
    ) -> Result<Option<IssuedPair>, MatchmakingError> {
        let _gate = self.refresh_gate.lock().await;

        {
            let mut round = self.round.lock().await;
            if round.id() != exhausted_round {
                let Some(visitor) = visitor else {
                    return Ok(None);
                };
                if let Issuance::Issued(issued) = round.issue(visitor) {
                    log_issued(visitor, &issued, round.id());
                    return Ok(Some(issued));
                }
            }
        }

        let snapshot = match self.roster.refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Roster refresh failed, serving stale roster: {}", e);
                let stale = self.roster.reshuffle_current().await;
                if stale.len() < 2 {
                    return Err(MatchmakingError::StoreUnavailable(e.to_string()));
                }
                stale
            }
        };

        let available = snapshot.len();
        let mut round = self.round.lock().await;
        *round = Round::new(snapshot, self.options.max_outstanding_nonces);
        tracing::info!("Round {} started with {} characters", round.id(), available);

        if available < 2 {
            return Err(MatchmakingError::InsufficientRoster { available });
        }

        let Some(visitor) = visitor else {
            return Ok(None);
        };
        match round.issue(visitor) {
            Issuance::Issued(issued) => {
                log_issued(visitor, &issued, round.id());
                Ok(Some(issued))
            }
            // A fresh round with two ids always has a pair at offset 0
            Issuance::Exhausted => Err(MatchmakingError::InsufficientRoster { available }),
        }
    }
}

fn log_issued(visitor: &VisitorId, issued: &IssuedPair, round_id: u64) {
    tracing::debug!(
        "Issued {} to {} at offset {} of round {}{}",
        issued.pair,
        visitor,
        issued.offset,
        round_id,
        if issued.reissued { " (sticky)" } else { "" }
    );
}

fn take_by_id(characters: &mut Vec<Character>, id: &str) -> Option<Character> {
    let index = characters.iter().position(|c| c.id == id)?;
    Some(characters.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ids: &[&str]) -> Arc<RosterSnapshot> {
        Arc::new(RosterSnapshot::new(
            7,
            ids.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn issued(issuance: Issuance) -> IssuedPair {
        match issuance {
            Issuance::Issued(pair) => pair,
            Issuance::Exhausted => panic!("round exhausted"),
        }
    }

    #[test]
    fn test_round_issues_sequential_pairs() {
        let mut round = Round::new(snapshot(&["b", "d", "a", "c"]), 100);

        let x = issued(round.issue(&VisitorId::from("x")));
        let y = issued(round.issue(&VisitorId::from("y")));

        assert_eq!(x.pair, CharacterPair::new("b", "d"));
        assert_eq!(y.pair, CharacterPair::new("a", "c"));
        assert_eq!(round.cursor, 4);
        assert!(matches!(round.issue(&VisitorId::from("z")), Issuance::Exhausted));
    }

    #[test]
    fn test_round_sticky_reissue_rotates_nonce() {
        let mut round = Round::new(snapshot(&["b", "d", "a", "c"]), 100);
        let visitor = VisitorId::from("x");

        let first = issued(round.issue(&visitor));
        let again = issued(round.issue(&visitor));

        assert_eq!(first.pair, again.pair);
        assert!(again.reissued);
        assert_ne!(first.nonce, again.nonce);
        assert!(!round.nonces.contains(&first.nonce));
        assert_eq!(round.cursor, 2);
        assert_eq!(round.nonces.outstanding(), 1);
    }

    #[test]
    fn test_round_accept_vote_checks() {
        let mut round = Round::new(snapshot(&["b", "d", "a", "c"]), 100);
        let x = issued(round.issue(&VisitorId::from("x")));

        assert!(matches!(
            round.accept_vote("b", "a", &x.nonce),
            Err(MatchmakingError::PairMismatch)
        ));
        // A mismatched ballot burns the nonce
        assert!(matches!(
            round.accept_vote("b", "d", &x.nonce),
            Err(MatchmakingError::NonceMismatch)
        ));
    }

    #[test]
    fn test_round_vote_releases_stickiness() {
        let mut round = Round::new(snapshot(&["b", "d", "a", "c"]), 100);
        let visitor = VisitorId::from("x");
        let x = issued(round.issue(&visitor));

        let binding = round.accept_vote("d", "b", &x.nonce).unwrap();
        assert_eq!(binding.visitor, visitor);
        assert!(round.stickiness.get(&visitor).is_none());
        assert!(round.voted.contains("b") && round.voted.contains("d"));

        let next = issued(round.issue(&visitor));
        assert_eq!(next.pair, CharacterPair::new("a", "c"));
    }

    #[test]
    fn test_round_rejects_second_vote_on_decided_character() {
        // Same id at two offsets, as if listed twice before a refresh
        let mut round = Round::new(snapshot(&["a", "b", "a", "c"]), 100);
        let x = issued(round.issue(&VisitorId::from("x")));
        let y = issued(round.issue(&VisitorId::from("y")));

        round.accept_vote("a", "b", &x.nonce).unwrap();
        assert!(matches!(
            round.accept_vote("c", "a", &y.nonce),
            Err(MatchmakingError::AlreadyVoted(id)) if id == "a"
        ));
        assert_eq!(round.voted.len(), 2);
    }

    #[test]
    fn test_round_abandon_drops_entry_and_nonce() {
        let mut round = Round::new(snapshot(&["b", "d", "a", "c"]), 100);
        let visitor = VisitorId::from("x");
        let x = issued(round.issue(&visitor));

        round.abandon(&visitor, &x);
        assert!(round.stickiness.is_empty());
        assert_eq!(round.nonces.outstanding(), 0);
    }

    #[test]
    fn test_take_by_id() {
        let mut found = vec![Character::new("a", "A"), Character::new("b", "B")];
        assert_eq!(take_by_id(&mut found, "b").unwrap().id, "b");
        assert!(take_by_id(&mut found, "b").is_none());
        assert_eq!(found.len(), 1);
    }
}
