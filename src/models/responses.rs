use serde::{Deserialize, Serialize};
use crate::models::domain::Character;

/// Character as the browser client sees it, with image handles turned into URLs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacterView {
    pub id: String,
    pub name: String,
    pub image32: String,
    pub image64: String,
    pub image128: String,
    pub image256: String,
    pub image512: String,
    pub race: String,
    pub gender: String,
    pub bloodline: String,
    pub wins: u64,
    pub losses: u64,
    #[serde(rename = "reportCount")]
    pub report_count: u64,
}

impl CharacterView {
    /// Build the view, prefixing every non-empty handle with `asset_path`
    pub fn from_character(character: Character, asset_path: &str) -> Self {
        let url = |handle: String| asset_url(asset_path, &handle);
        Self {
            id: character.id,
            name: character.name,
            image32: url(character.images.image32),
            image64: url(character.images.image64),
            image128: url(character.images.image128),
            image256: url(character.images.image256),
            image512: url(character.images.image512),
            race: character.race,
            gender: character.gender,
            bloodline: character.bloodline,
            wins: character.wins,
            losses: character.losses,
            report_count: character.report_count,
        }
    }
}

fn asset_url(asset_path: &str, handle: &str) -> String {
    if handle.is_empty() {
        return String::new();
    }
    format!(
        "{}/{}",
        asset_path.trim_end_matches('/'),
        urlencoding::encode(handle)
    )
}

/// Response for the pair fetch endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResponse {
    pub nonce: String,
    pub characters: Vec<CharacterView>,
}

/// Any listing of characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharactersResponse {
    pub characters: Vec<CharacterView>,
}

/// Minimal entry of the full roster listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacterName {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterNamesResponse {
    pub characters: Vec<CharacterName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::CharacterImages;

    #[test]
    fn test_view_turns_handles_into_urls() {
        let mut character = Character::new("42", "Forty Two");
        character.images = CharacterImages::for_character("42");
        character.report_count = 1;

        let view = CharacterView::from_character(character, "/api/assets/");
        assert_eq!(view.image32, "/api/assets/42_32.jpg");
        assert_eq!(view.image512, "/api/assets/42_512.jpg");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["reportCount"], 1);
        assert_eq!(json["id"], "42");
    }

    #[test]
    fn test_missing_handle_stays_empty() {
        let view = CharacterView::from_character(Character::new("1", "One"), "/api/assets");
        assert_eq!(view.image64, "");
    }
}
