use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use arena_vote::config::{DatabaseBackend, LoggingSettings, Settings, StorageBackend};
use arena_vote::core::MatchmakingService;
use arena_vote::routes::{self, AppState, RouteSettings};
use arena_vote::services::{
    AppwriteStorage, AssetStore, CacheManager, EntityStore, InMemoryAssetStore,
    InMemoryEntityStore, PostgresClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match logging.format.as_str() {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Logging is not up yet, so configuration errors go to stderr
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        io_error("Configuration error", e)
    })?;

    init_logging(&settings.logging);
    info!("Starting Arena Vote service...");

    let store: Arc<dyn EntityStore> = match settings.database.backend {
        DatabaseBackend::Postgres => {
            let db_max_conn = settings.database.max_connections.unwrap_or(10);
            let db_min_conn = settings.database.min_connections.unwrap_or(1);

            let postgres = PostgresClient::from_settings(
                &settings.database.url,
                Some(db_max_conn),
                Some(db_min_conn),
                settings.database.acquire_timeout_secs,
                settings.database.idle_timeout_secs,
            )
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                io_error("PostgreSQL connection error", e)
            })?;

            info!("PostgreSQL client initialized (max: {} connections)", db_max_conn);
            Arc::new(postgres)
        }
        DatabaseBackend::Memory => {
            warn!("Using the in-memory entity store, tallies will not survive a restart");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    let assets: Arc<dyn AssetStore> = match settings.storage.backend {
        StorageBackend::Appwrite => {
            let storage = AppwriteStorage::new(
                settings.storage.endpoint.clone(),
                settings.storage.api_key.clone(),
                settings.storage.project_id.clone(),
                settings.storage.bucket_id.clone(),
                Duration::from_secs(settings.storage.timeout_secs.unwrap_or(30)),
            )
            .map_err(|e| {
                error!("Failed to build Appwrite storage client: {}", e);
                io_error("Storage client error", e)
            })?;

            info!("Appwrite storage initialized (bucket: {})", settings.storage.bucket_id);
            Arc::new(storage)
        }
        StorageBackend::Memory => Arc::new(InMemoryAssetStore::new()),
    };

    // Redis is optional, the cache degrades to in-process only
    let cache_ttl = settings.cache.ttl_secs.unwrap_or(60);
    let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(1000);
    let cache = Arc::new(
        CacheManager::connect(settings.cache.redis_url.as_deref(), l1_cache_size, cache_ttl).await,
    );
    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s, redis: {})",
        l1_cache_size,
        cache_ttl,
        cache.has_redis()
    );

    let options = settings.matchmaking.options();
    let matchmaking = Arc::new(MatchmakingService::new(Arc::clone(&store), options));
    info!("Matchmaking initialized with options: {:?}", options);

    if settings.matchmaking.warm_up {
        match matchmaking.warm_up().await {
            Ok(()) => info!("Roster loaded"),
            Err(e) => warn!("Roster warm-up failed, retrying on first request: {}", e),
        }
    }

    let app_state = AppState::new(
        matchmaking,
        store,
        assets,
        cache,
        RouteSettings {
            asset_path: settings.storage.public_path.clone(),
            trust_proxy_headers: settings.server.trust_proxy_headers,
            report_threshold: settings.moderation.report_threshold,
            admin_secret: settings.moderation.admin_secret.clone(),
        },
    );

    let jobs = app_state.housekeeper.clone().spawn(settings.housekeeping.schedule());
    info!("Started {} housekeeping jobs", jobs.len());

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(routes::handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(routes::handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    for job in jobs {
        job.abort();
    }
    result
}
