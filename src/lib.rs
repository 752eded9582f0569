//! Arena Vote - pairwise character voting service
//!
//! Visitors are shown two characters at a time and pick a winner. The
//! matchmaking engine walks a shuffled roster in pairs, keeps an un-voted
//! visitor on the same pair, and accepts each vote only once against a
//! single-use nonce before the tallies are updated.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{MatchmakingError, MatchmakingOptions, MatchmakingService, Matchup, VoteReceipt};
pub use models::{Character, CharacterPair, VisitorId};
pub use services::{EntityStore, InMemoryEntityStore, StoreError};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_library_exports() {
        let store = Arc::new(InMemoryEntityStore::with_characters([
            Character::new("1", "One"),
            Character::new("2", "Two"),
        ]));
        let service = MatchmakingService::new(store, MatchmakingOptions::default());

        let issued = service.next_pair(&VisitorId::from("10.0.0.1")).await.unwrap();
        assert!(issued.pair.contains("1") && issued.pair.contains("2"));
    }
}
