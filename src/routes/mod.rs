// Route exports
pub mod assets;
pub mod characters;
pub mod error;

use actix_web::web;
use std::sync::Arc;

use crate::core::MatchmakingService;
use crate::services::{AssetStore, CacheManager, EntityStore, Housekeeper};

pub use error::{handle_json_payload_error, handle_query_payload_error, ApiError};

/// Request-path knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct RouteSettings {
    /// Prefix of the image URLs handed to clients
    pub asset_path: String,
    pub trust_proxy_headers: bool,
    pub report_threshold: u64,
    pub admin_secret: Option<String>,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            asset_path: "/api/assets".to_string(),
            trust_proxy_headers: false,
            report_threshold: 3,
            admin_secret: None,
        }
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matchmaking: Arc<MatchmakingService>,
    pub store: Arc<dyn EntityStore>,
    pub assets: Arc<dyn AssetStore>,
    pub cache: Arc<CacheManager>,
    pub housekeeper: Housekeeper,
    pub settings: RouteSettings,
}

impl AppState {
    pub fn new(
        matchmaking: Arc<MatchmakingService>,
        store: Arc<dyn EntityStore>,
        assets: Arc<dyn AssetStore>,
        cache: Arc<CacheManager>,
        settings: RouteSettings,
    ) -> Self {
        let housekeeper = Housekeeper::new(
            Arc::clone(&store),
            Arc::clone(&assets),
            Arc::clone(&cache),
        );
        Self {
            matchmaking,
            store,
            assets,
            cache,
            housekeeper,
            settings,
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(characters::configure)
            .configure(assets::configure),
    );
}
