// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control plane's HTTP + SSE transport (§6). Every route runs through
//! [`auth::auth_layer`] (except `/health`) and a permissive-by-default CORS
//! layer configured from [`crate::config::Config::cors_origin_list`].

pub mod auth;
pub mod dto;
pub mod messages;
pub mod state;
pub mod stream;
pub mod system;
pub mod threads;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::app::App;
pub use state::AppState;

/// Build the axum `Router` wiring every route in §6 to its handler, with the
/// auth and CORS layers applied around the whole surface.
pub fn build_router(app: Arc<App>) -> Router {
    let state = AppState::new(app.clone());
    let cors = build_cors_layer(&app.config.cors_origin_list());

    Router::new()
        .route("/threads", get(threads::list_threads).post(threads::create_thread))
        .route("/threads/all", delete(threads::reset_all))
        .route("/threads/{id}", get(threads::get_thread))
        .route("/threads/{id}/status", patch(threads::patch_status))
        .route("/threads/{id}/config", patch(threads::patch_config))
        .route("/threads/{id}/title", patch(threads::patch_title))
        .route("/threads/{id}/messages", get(messages::list_messages).post(messages::post_message).delete(messages::delete_messages))
        .route("/threads/{id}/archive", post(threads::archive_thread))
        .route("/threads/{id}/unarchive", post(threads::unarchive_thread))
        .route("/threads/{id}/stop", post(threads::stop_thread))
        .route("/threads/{id}/answer", post(messages::answer))
        .route("/threads/{id}/plan-action", post(messages::plan_action))
        .route("/threads/{id}/tokens", get(threads::tokens))
        .route("/threads/{id}/usage", get(threads::usage))
        .route("/threads/{id}/files", get(threads::list_files))
        .route("/threads/{id}/stream", get(stream::stream_thread))
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/stats", get(system::stats))
        .route("/time", get(system::time))
        .route("/cwd", get(system::cwd))
        .route("/browse", get(system::browse))
        .route("/directories", get(system::directories))
        .route("/directories/suggestions", get(system::directories_suggestions))
        .route("/git/info", get(system::git_info))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new().allow_origin(parsed).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
}
