// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Character, CharacterImages, CharacterOrder, CharacterPair, CharacterQuery, Outcome, VisitorId, IMAGE_SIZES};
pub use requests::{AdminQuery, CreateCharacterRequest, ReportRequest, VoteRequest};
pub use responses::{CharacterName, CharacterNamesResponse, CharacterView, CharactersResponse, CountResponse, ErrorResponse, HealthResponse, PairResponse};
