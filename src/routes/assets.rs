use actix_web::{http::header, web, HttpResponse};

use crate::routes::{ApiError, AppState};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/assets/{handle}", web::get().to(get_asset));
}

/// Stream a stored portrait back with its content type
///
/// GET /api/assets/{handle}
async fn get_asset(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let handle = path.into_inner();
    let asset = state.assets.fetch(&handle).await?;

    Ok(HttpResponse::Ok()
        .content_type(asset.content_type)
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::Public,
            header::CacheDirective::MaxAge(86_400),
        ]))
        .body(asset.bytes))
}
