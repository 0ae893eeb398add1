//! Web server adapter.
//!
//! JSON REST API under `/api/v1` plus a WebSocket feed of record changes.

mod auth;
mod error;
mod handlers;
mod ws;

pub use auth::{ApiAccess, Authenticated};
pub use error::{WebError, status_from_error};
pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::adapters::broadcast_notifier::BroadcastNotifier;
use crate::domain::config_validation::ServerSettings;
use crate::domain::error::ScreenerError;
use crate::ports::account_port::AccountPort;
use crate::ports::currency_port::CurrencyPort;
use crate::ports::mail_port::MailPort;
use crate::ports::record_port::RecordPort;

pub struct AppState {
    pub records: Arc<dyn RecordPort + Send + Sync>,
    pub currencies: Arc<dyn CurrencyPort + Send + Sync>,
    pub accounts: Arc<dyn AccountPort + Send + Sync>,
    pub notifier: Arc<BroadcastNotifier>,
    pub mailer: Arc<dyn MailPort + Send + Sync>,
    pub settings: ServerSettings,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/", get(handlers::health))
        .route("/api/v1/accounts/auth/", post(handlers::login))
        .route("/api/v1/accounts/logout/", post(handlers::logout))
        .route(
            "/api/v1/accounts/request-password-reset/",
            post(handlers::request_password_reset),
        )
        .route(
            "/api/v1/accounts/validate-reset-token/",
            post(handlers::validate_reset_token),
        )
        .route(
            "/api/v1/accounts/reset-password/",
            post(handlers::reset_password),
        )
        .route(
            "/api/v1/currencies/",
            get(handlers::list_currencies).post(handlers::create_currency),
        )
        .route(
            "/api/v1/currencies/{id}/delete/",
            delete(handlers::delete_currency),
        )
        .route(
            "/api/v1/ema-records/",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route("/api/v1/ema-records/{id}/", patch(handlers::update_record))
        .route("/ws/ema-record/update/", get(ws::record_updates))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), ScreenerError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
