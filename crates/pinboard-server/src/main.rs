mod config;

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use pinboard_api::AppStateInner;
use pinboard_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        csrf = config.edge.csrf,
        tls = config.edge.tls,
        session_ttl_hours = config.edge.session_ttl.num_hours(),
        "Configuration loaded"
    );

    let db = Database::open(&config.db_path)?;
    let state = AppStateInner::new(db, config.edge.clone());

    let app = pinboard_api::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(config.cors_origin.as_deref())?),
    );

    info!("Pinboard server listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };

    let csrf = HeaderName::from_static(pinboard_api::middleware::CSRF_HEADER);
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, csrf.clone()])
        .expose_headers([csrf]))
}
