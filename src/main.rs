//! SmartVault Backend
//!
//! Tag-based message vault for chat bots: SQLite persistence and an OCR bridge.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod ocr;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{ChatManager, SessionManager, TagManager};
use ocr::OcrClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub chats: Arc<ChatManager>,
    pub tags: Arc<TagManager>,
    pub sessions: Arc<SessionManager>,
    pub ocr: Option<Arc<OcrClient>>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SmartVault Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (SMARTVAULT_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;

    let ocr = match config.ocr_base_url.as_deref() {
        Some(base_url) => {
            tracing::info!(base_url, timeout = ?config.ocr_timeout, "OCR service configured");
            Some(Arc::new(OcrClient::new(base_url, config.ocr_timeout)?))
        }
        None => {
            tracing::warn!("No OCR service configured (SMARTVAULT_OCR_BASE_URL). Transcription is disabled!");
            None
        }
    };

    let state = AppState {
        chats: Arc::new(ChatManager::new(pool.clone())),
        tags: Arc::new(TagManager::new(pool.clone())),
        sessions: Arc::new(SessionManager::new(pool)),
        ocr,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    // Everything a member does inside one chat
    let vault_routes = Router::new()
        .route("/tags", get(api::get_tags))
        .route("/tags/{tag}", put(api::rename_tag).delete(api::delete_tag))
        .route("/tags/{tag}/messages", post(api::add_tag_to_many))
        .route("/messages", get(api::get_messages))
        .route("/messages/tags", post(api::add_tags_to_many))
        .route("/messages/{message_id}", delete(api::delete_message))
        .route(
            "/messages/{message_id}/tags",
            get(api::get_message_tags).post(api::add_message_tags),
        )
        .route(
            "/messages/{message_id}/tags/{tag}",
            put(api::reassign_tag).delete(api::remove_tag_from_message),
        )
        .route("/session", post(api::update_session));

    let api_routes = Router::new()
        // Chats
        .route("/chats", post(api::add_chat))
        .route("/chats/{chat_id}", get(api::get_chat).delete(api::remove_chat))
        .route("/chats/{chat_id}/users", get(api::get_chat_users))
        .route("/chats/{chat_id}/members", post(api::remember_user))
        .route("/chats/{chat_id}/members/{user_id}", delete(api::forget_user))
        .route("/chats/{chat_id}/session", delete(api::end_session))
        // Users
        .route("/users/{user_id}/chats", get(api::get_user_chats))
        .route("/users/{user_id}/main-chat", get(api::get_main_chat))
        .route("/users/{user_id}/ext-chats", get(api::get_ext_chats))
        .route(
            "/users/{user_id}/chats/{chat_id}/membership",
            get(api::is_user_in_chat),
        )
        .nest("/users/{user_id}/chats/{chat_id}", vault_routes)
        // OCR
        .route("/ocr", post(api::transcribe))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
