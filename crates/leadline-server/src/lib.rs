//! Leadline server library logic.
//!
//! Hosts the telephony media-stream endpoint and, per call, the transport
//! bridge that runs a qualification conversation against a realtime AI
//! session.

pub mod bridge;
pub mod calendar;
pub mod collaborators;
pub mod config;
pub mod evaluation;
pub mod lifecycle;
pub mod records;
pub mod scripts;
pub mod session;
pub mod tools;
pub mod ws;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use leadline_qualify::ExtractorChain;
use leadline_store::DbPool;
use leadline_voice::WsRealtimeConnector;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::bridge::BridgeSettings;
use crate::calendar::calendar_from_config;
use crate::collaborators::{CallServices, CollaboratorError};
use crate::config::Config;
use crate::evaluation::evaluator_from_config;
use crate::records::SqliteInteractionStore;
use crate::scripts::StoreScriptSource;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Collaborators and settings handed to every call bridge.
    pub services: CallServices,
    /// Number of calls currently connected.
    pub active_calls: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(services: CallServices) -> Self {
        Self {
            services,
            active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Health check handler.
///
/// Returns server status, version and the number of live calls.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.active_calls.load(Ordering::SeqCst),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/media-stream", get(ws::media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}

/// Wires the production collaborators from configuration.
///
/// # Errors
///
/// Returns `CollaboratorError` if an HTTP client cannot be built.
pub fn services_from_config(config: &Config, pool: DbPool) -> Result<CallServices, CollaboratorError> {
    let extractor = if config.extractor.api_key.is_empty() {
        tracing::info!("extractor.api_key is empty, using pattern extraction only");
        ExtractorChain::pattern_only()
    } else {
        match ExtractorChain::with_model(config.extractor.clone()) {
            Ok(chain) => chain,
            Err(e) => {
                tracing::warn!(error = %e, "model extractor unavailable, using pattern extraction only");
                ExtractorChain::pattern_only()
            }
        }
    };

    if config.realtime.api_key.is_empty() {
        tracing::warn!("realtime.api_key is empty, calls will fail to connect");
    }

    Ok(CallServices {
        scripts: Arc::new(StoreScriptSource::new(pool.clone(), config.scripts.clone())),
        store: Arc::new(SqliteInteractionStore::new(pool)),
        calendar: calendar_from_config(&config.calendar)?,
        evaluator: evaluator_from_config(&config.evaluation)?,
        extractor,
        realtime: Arc::new(WsRealtimeConnector::new(config.realtime.clone())),
        settings: BridgeSettings {
            context_timeout: config.call.context_timeout(),
            inbound_queue_capacity: config.call.inbound_queue_capacity,
            realtime: config.realtime.clone(),
        },
    })
}
