use serde::{Deserialize, Serialize};
use std::fmt;

/// Image sizes every character carries, in pixels
pub const IMAGE_SIZES: [u16; 5] = [32, 64, 128, 256, 512];

/// A roster entry with its running tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub images: CharacterImages,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub bloodline: String,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub losses: u64,
    #[serde(rename = "reportCount", default)]
    pub report_count: u64,
}

impl Character {
    /// Bare character with empty images and a zero tally
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            images: CharacterImages::default(),
            race: String::new(),
            gender: String::new(),
            bloodline: String::new(),
            wins: 0,
            losses: 0,
            report_count: 0,
        }
    }

    /// Share of decided votes this character won, 0.0 before its first vote
    pub fn win_rate(&self) -> f64 {
        let games = self.wins + self.losses;
        if games == 0 {
            0.0
        } else {
            self.wins as f64 / games as f64
        }
    }
}

/// Asset handles for the five image sizes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterImages {
    #[serde(default)]
    pub image32: String,
    #[serde(default)]
    pub image64: String,
    #[serde(default)]
    pub image128: String,
    #[serde(default)]
    pub image256: String,
    #[serde(default)]
    pub image512: String,
}

impl CharacterImages {
    /// Handles named `{id}_{size}.jpg`, the layout the ingestion pipeline writes
    pub fn for_character(id: &str) -> Self {
        let handle = |size: u16| format!("{}_{}.jpg", id, size);
        Self {
            image32: handle(32),
            image64: handle(64),
            image128: handle(128),
            image256: handle(256),
            image512: handle(512),
        }
    }

    /// Non-empty handles, smallest first
    pub fn handles(&self) -> Vec<&str> {
        [
            &self.image32,
            &self.image64,
            &self.image128,
            &self.image256,
            &self.image512,
        ]
        .into_iter()
        .map(String::as_str)
        .filter(|h| !h.is_empty())
        .collect()
    }
}

/// Network-origin identity of an anonymous visitor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VisitorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two character ids handed out together, in roster order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterPair {
    pub first: String,
    pub second: String,
}

impl CharacterPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn ids(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }

    pub fn contains(&self, id: &str) -> bool {
        self.first == id || self.second == id
    }

    /// True when `{winner, loser}` is this pair as an unordered set
    pub fn is_decided_by(&self, winner: &str, loser: &str) -> bool {
        (self.first == winner && self.second == loser)
            || (self.first == loser && self.second == winner)
    }
}

impl fmt::Display for CharacterPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.second)
    }
}

/// Which counter a tally increment touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

/// Ordering for character listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterOrder {
    MostWins,
    MostLosses,
}

/// Listing query against the entity store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterQuery {
    pub race: Option<String>,
    pub bloodline: Option<String>,
    pub order: CharacterOrder,
    pub limit: Option<usize>,
}

impl CharacterQuery {
    pub fn most_wins(limit: usize) -> Self {
        Self {
            race: None,
            bloodline: None,
            order: CharacterOrder::MostWins,
            limit: Some(limit),
        }
    }

    pub fn most_losses(limit: usize) -> Self {
        Self {
            order: CharacterOrder::MostLosses,
            ..Self::most_wins(limit)
        }
    }

    /// Every character, most wins first
    pub fn all() -> Self {
        Self {
            limit: None,
            ..Self::most_wins(0)
        }
    }

    pub fn with_race(mut self, race: impl Into<String>) -> Self {
        self.race = Some(race.into());
        self
    }

    pub fn with_bloodline(mut self, bloodline: impl Into<String>) -> Self {
        self.bloodline = Some(bloodline.into());
        self
    }

    /// In-memory equivalent of the store-side WHERE clause
    pub fn accepts(&self, character: &Character) -> bool {
        self.race.as_deref().map_or(true, |r| character.race == r)
            && self
                .bloodline
                .as_deref()
                .map_or(true, |b| character.bloodline == b)
    }
}
