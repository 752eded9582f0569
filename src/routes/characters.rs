use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::{de::DeserializeOwned, Serialize};
use validator::Validate;

use crate::core::leaderboard::{LEADERBOARD_SIZE, TOP_SIZE, WORST_SIZE};
use crate::core::{normalize_category, rank_by_win_rate, MatchmakingError};
use crate::models::{
    AdminQuery, Character, CharacterName, CharacterNamesResponse, CharacterQuery, CharacterView,
    CharactersResponse, CountResponse, CreateCharacterRequest, HealthResponse, PairResponse,
    ReportRequest, VisitorId, VoteRequest,
};
use crate::routes::{ApiError, AppState};
use crate::services::{CacheKey, CacheManager};

/// Configure the character, vote and moderation routes
///
/// Fixed `/characters/...` paths are registered ahead of `/characters/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/characters", web::get().to(next_pair))
        .route("/characters", web::post().to(create_character))
        .route("/vote", web::put().to(vote))
        .route("/report", web::post().to(report))
        .route("/leaderboard", web::get().to(leaderboard))
        .route("/count", web::get().to(count))
        .route("/characters/top", web::get().to(top))
        .route("/characters/top/{race}", web::get().to(top_by_race))
        .route("/characters/top/{race}/{bloodline}", web::get().to(top_by_bloodline))
        .route("/characters/worst", web::get().to(worst))
        .route("/characters/all", web::get().to(all))
        .route("/characters/{id}", web::get().to(get_character))
        .route("/characters/{id}", web::delete().to(delete_character));
}

/// Who is asking: the peer address, or the forwarded client address when
/// the service sits behind a trusted proxy
pub fn visitor_id(req: &HttpRequest, trust_proxy_headers: bool) -> VisitorId {
    let info = req.connection_info();
    let addr = if trust_proxy_headers {
        info.realip_remote_addr()
    } else {
        info.peer_addr()
    };
    VisitorId::new(addr.unwrap_or("unknown"))
}

fn text(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}

/// Cached copy of `key`, if any
///
/// Cache failures only cost a store round-trip.
async fn cache_lookup<T: DeserializeOwned>(cache: &CacheManager, key: &str) -> Option<T> {
    cache.get::<T>(key).await.ok()
}

async fn cache_store<T: Serialize>(cache: &CacheManager, key: &str, value: &T) {
    if let Err(e) = cache.set(key, value).await {
        tracing::warn!("Failed to cache {}: {}", key, e);
    }
}

async fn listing(
    state: &AppState,
    key: String,
    query: CharacterQuery,
    by_win_rate: bool,
) -> Result<HttpResponse, ApiError> {
    if let Some(characters) = cache_lookup::<Vec<CharacterView>>(&state.cache, &key).await {
        return Ok(HttpResponse::Ok().json(CharactersResponse { characters }));
    }

    let mut characters = state.store.list(&query).await?;
    if by_win_rate {
        characters = rank_by_win_rate(characters);
    }
    let characters = views(characters, &state.settings.asset_path);
    cache_store(&state.cache, &key, &characters).await;

    Ok(HttpResponse::Ok().json(CharactersResponse { characters }))
}

fn views(characters: Vec<Character>, asset_path: &str) -> Vec<CharacterView> {
    characters
        .into_iter()
        .map(|c| CharacterView::from_character(c, asset_path))
        .collect()
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_healthy = state.store.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Next pair to vote on
///
/// GET /api/characters
///
/// Response body:
/// ```json
/// { "nonce": "hex", "characters": [{ "id": "..." }, { "id": "..." }] }
/// ```
async fn next_pair(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let visitor = visitor_id(&req, state.settings.trust_proxy_headers);
    let matchup = state.matchmaking.next_matchup(&visitor).await?;

    Ok(HttpResponse::Ok()
        .insert_header(header::CacheControl(vec![header::CacheDirective::NoStore]))
        .json(PairResponse {
            nonce: matchup.nonce,
            characters: views(matchup.characters.into(), &state.settings.asset_path),
        }))
}

/// Record a vote on the pair issued with `nonce`
///
/// PUT /api/vote
///
/// Request body:
/// ```json
/// { "winner": "id", "loser": "id", "nonce": "hex" }
/// ```
async fn vote(
    state: web::Data<AppState>,
    body: web::Json<VoteRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    if let Err(errors) = body.validate() {
        tracing::info!("Validation failed for vote request: {}", errors);
        return Err(MatchmakingError::InvalidVote(errors.to_string()).into());
    }

    let visitor = visitor_id(&req, state.settings.trust_proxy_headers);
    state
        .matchmaking
        .record_vote(&body.winner, &body.loser, &body.nonce, &visitor)
        .await?;

    Ok(text("Wins and Losses have been updated".to_string()))
}

/// Report a character; enough reports remove it
///
/// POST /api/report
async fn report(
    state: web::Data<AppState>,
    body: web::Json<ReportRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    body.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let visitor = visitor_id(&req, state.settings.trust_proxy_headers);
    let id = &body.character_id;
    let character = state
        .store
        .increment_reports(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No such character: {}", id)))?;

    if character.report_count >= state.settings.report_threshold {
        state.housekeeper.purge_character(id).await?;
        tracing::info!("{} has been deleted by {}", character.name, visitor);
        return Ok(text(format!("{} has been deleted", character.name)));
    }

    tracing::info!("{} has been reported by {}", character.name, visitor);
    Ok(text(format!("{} has been reported", character.name)))
}

/// Most wins, reordered by win rate
async fn leaderboard(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    listing(
        &state,
        CacheKey::leaderboard(),
        CharacterQuery::most_wins(LEADERBOARD_SIZE),
        true,
    )
    .await
}

async fn top(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    listing(
        &state,
        CacheKey::top(None, None),
        CharacterQuery::most_wins(TOP_SIZE),
        false,
    )
    .await
}

async fn top_by_race(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let race = normalize_category(&path.into_inner());
    listing(
        &state,
        CacheKey::top(Some(&race), None),
        CharacterQuery::most_wins(TOP_SIZE).with_race(race.as_str()),
        false,
    )
    .await
}

async fn top_by_bloodline(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (race, bloodline) = path.into_inner();
    let race = normalize_category(&race);
    let bloodline = normalize_category(&bloodline);
    listing(
        &state,
        CacheKey::top(Some(&race), Some(&bloodline)),
        CharacterQuery::most_wins(TOP_SIZE)
            .with_race(race.as_str())
            .with_bloodline(bloodline.as_str()),
        false,
    )
    .await
}

/// Hall of shame
async fn worst(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    listing(
        &state,
        CacheKey::worst(),
        CharacterQuery::most_losses(WORST_SIZE),
        false,
    )
    .await
}

async fn all(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let key = CacheKey::all();
    if let Some(characters) = cache_lookup::<Vec<CharacterName>>(&state.cache, &key).await {
        return Ok(HttpResponse::Ok().json(CharacterNamesResponse { characters }));
    }

    let characters: Vec<CharacterName> = state
        .store
        .list(&CharacterQuery::all())
        .await?
        .into_iter()
        .map(|c| CharacterName { id: c.id, name: c.name })
        .collect();
    cache_store(&state.cache, &key, &characters).await;

    Ok(HttpResponse::Ok().json(CharacterNamesResponse { characters }))
}

async fn count(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let key = CacheKey::count();
    let count = match cache_lookup::<u64>(&state.cache, &key).await {
        Some(count) => count,
        None => {
            let count = state.store.count().await?;
            cache_store(&state.cache, &key, &count).await;
            count
        }
    };

    Ok(HttpResponse::Ok().json(CountResponse { count }))
}

async fn get_character(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let character = state
        .store
        .find(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No such character: {}", id)))?;

    Ok(HttpResponse::Ok().json(CharacterView::from_character(
        character,
        &state.settings.asset_path,
    )))
}

/// Reject admin calls without the configured secret code
fn authorize_admin(
    state: &AppState,
    query: &AdminQuery,
    req: &HttpRequest,
    action: &str,
) -> Result<(), ApiError> {
    let Some(secret) = state.settings.admin_secret.as_deref() else {
        return Err(ApiError::Forbidden("Admin endpoint is disabled".to_string()));
    };
    if query.secret_code.as_deref() != Some(secret) {
        tracing::warn!(
            "Rejected {} from {}: bad secret code",
            action,
            visitor_id(req, state.settings.trust_proxy_headers)
        );
        return Err(ApiError::Forbidden("Invalid secret code".to_string()));
    }
    Ok(())
}

/// Provision a character whose images are already in storage
///
/// POST /api/characters?secretCode=...
///
/// The character joins matchmaking when the next round starts.
async fn create_character(
    state: web::Data<AppState>,
    body: web::Json<CreateCharacterRequest>,
    query: web::Query<AdminQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    authorize_admin(&state, &query, &req, "create")?;
    body.validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let character = body.into_inner().into_character();
    if !state.store.create(character.clone()).await? {
        return Err(ApiError::Conflict(format!(
            "Character {} already exists",
            character.id
        )));
    }

    if let Err(e) = state.cache.invalidate_pattern(CacheKey::LISTINGS).await {
        tracing::warn!("Failed to invalidate listings after create: {}", e);
    }
    tracing::info!("Added {} ({})", character.name, character.id);

    Ok(HttpResponse::Created().json(CharacterView::from_character(
        character,
        &state.settings.asset_path,
    )))
}

/// Remove a character and its images
///
/// DELETE /api/characters/{id}?secretCode=...
async fn delete_character(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<AdminQuery>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    authorize_admin(&state, &query, &req, &format!("delete of {}", path.as_str()))?;

    let id = path.into_inner();
    let character = state
        .housekeeper
        .purge_character(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No such character: {}", id)))?;

    Ok(text(format!("{} has been deleted", character.name)))
}
