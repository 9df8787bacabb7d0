use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    handlers::{
        health::service_info,
        sync::{debug_drivers, sync_drivers, sync_lineups, sync_standings, sync_teams},
    },
    utils::state::AppState,
};

pub fn sync_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(sync_drivers))
        .route("/drivers/debug", post(debug_drivers))
        .route("/teams", post(sync_teams))
        .route("/lineups", post(sync_lineups))
        .route("/standings", post(sync_standings))
        .route("/info", get(service_info))
}
