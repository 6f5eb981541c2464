use anyhow::Context;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use hearthchat::{chat::Chat, config::Config, db::SqliteStore, realtime::Hub, router, AppState};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hearthchat=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_idle));

    let store = SqliteStore::connect(&config.database_url, config.db_max_connections)
        .await
        .context("opening the message store")?;
    let hub = Hub::new(config.hub_config());
    let chat = Chat::new(store, hub).with_edit_window(config.edit_window);

    let mut app = router()
        .with_state(AppState::new(chat))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());
    if let Some(origin) = &config.cors_origin {
        let origin: HeaderValue = origin.parse().context("invalid CORS_ORIGIN")?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([CONTENT_TYPE])
                .allow_credentials(true),
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
