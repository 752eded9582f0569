use crate::models::{Character, CharacterImages};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ballot submitted after a pair fetch
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VoteRequest {
    #[validate(length(min = 1))]
    #[serde(default)]
    pub winner: String,
    #[validate(length(min = 1))]
    #[serde(default)]
    pub loser: String,
    // Not validated: a missing nonce is a nonce mismatch, not a malformed ballot
    #[serde(default)]
    pub nonce: String,
}

/// Moderation report against a character
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "character_id", rename = "characterId")]
    pub character_id: String,
}

/// Character provisioned by an admin
///
/// Image fields are handles of assets already in storage. Missing ones default
/// to the `{id}_{size}.jpg` naming used by the bulk importers.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCharacterRequest {
    #[validate(length(min = 1, max = 64))]
    #[serde(alias = "character_id", rename = "characterId")]
    pub character_id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub bloodline: String,
    pub image32: Option<String>,
    pub image64: Option<String>,
    pub image128: Option<String>,
    pub image256: Option<String>,
    pub image512: Option<String>,
}

impl CreateCharacterRequest {
    pub fn into_character(self) -> Character {
        let defaults = CharacterImages::for_character(&self.character_id);
        let mut character = Character::new(self.character_id, self.name);
        character.images = CharacterImages {
            image32: self.image32.unwrap_or(defaults.image32),
            image64: self.image64.unwrap_or(defaults.image64),
            image128: self.image128.unwrap_or(defaults.image128),
            image256: self.image256.unwrap_or(defaults.image256),
            image512: self.image512.unwrap_or(defaults.image512),
        };
        character.race = self.race;
        character.gender = self.gender;
        character.bloodline = self.bloodline;
        character
    }
}

/// Query string of the admin endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminQuery {
    #[serde(alias = "secret_code", rename = "secretCode", default)]
    pub secret_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_missing_images() {
        let request: CreateCharacterRequest = serde_json::from_str(
            r#"{"characterId": "91", "name": "Pilot 91", "race": "Amarr", "image512": "custom.png"}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());

        let character = request.into_character();
        assert_eq!(character.images.image32, "91_32.jpg");
        assert_eq!(character.images.image512, "custom.png");
        assert_eq!(character.race, "Amarr");
        assert_eq!((character.wins, character.losses, character.report_count), (0, 0, 0));
    }

    #[test]
    fn test_create_request_requires_id_and_name() {
        let request: CreateCharacterRequest =
            serde_json::from_str(r#"{"characterId": "", "name": ""}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("character_id"));
        assert!(errors.field_errors().contains_key("name"));
    }
}
