// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Axum `State` extractor wiring: every handler reaches the control plane
//! through one shared [`App`](crate::app::App), never a global.

use std::sync::Arc;
use std::time::Instant;

use crate::app::App;

/// Shared state handed to every axum handler. Wraps the wired-up `App` plus
/// the process start time, used by `/stats` and `/health`.
pub struct AppState {
    pub app: Arc<App>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(app: Arc<App>) -> Arc<Self> {
        Arc::new(Self { app, started_at: Instant::now() })
    }
}
