// Core engine exports
pub mod guard;
pub mod leaderboard;
pub mod matchmaking;
pub mod nonce;
pub mod roster;
pub mod stickiness;

pub use guard::{validate_ballot, Ballot, RetryPolicy, VoteGuard, VotedSet};
pub use leaderboard::{normalize_category, rank_by_win_rate};
pub use matchmaking::{IssuedPair, MatchmakingError, MatchmakingOptions, MatchmakingService, Matchup, RoundStatus, VoteReceipt};
pub use nonce::{mint_nonce, NonceBinding, NonceLedger};
pub use roster::{RosterCache, RosterSnapshot};
pub use stickiness::{StickinessEntry, StickinessTable};
