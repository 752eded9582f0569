use crate::models::Character;
use std::cmp::Ordering;

/// Size of the leaderboard shown in the page footer
pub const LEADERBOARD_SIZE: usize = 14;
/// Size of the top listings
pub const TOP_SIZE: usize = 100;
/// Size of the hall of shame
pub const WORST_SIZE: usize = 25;

/// Reorder characters by win rate, highest first
///
/// Ties keep their incoming order, which is most wins first when the input
/// comes from a `MostWins` listing.
pub fn rank_by_win_rate(mut characters: Vec<Character>) -> Vec<Character> {
    characters.sort_by(|a, b| {
        b.win_rate()
            .partial_cmp(&a.win_rate())
            .unwrap_or(Ordering::Equal)
    });
    characters
}

/// Normalize a race or bloodline path segment to its stored spelling
///
/// Every hyphen-separated word is capitalized: `amarr` -> `Amarr`,
/// `jin-mei` -> `Jin-Mei`, `ni-kunni` -> `Ni-Kunni`.
pub fn normalize_category(raw: &str) -> String {
    raw.trim()
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}
