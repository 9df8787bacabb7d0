use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::{error, info};

use crate::{
    models::{
        error::Error,
        reference::ConfirmedRoster,
        sync::{
            DriverDebugData, DriverDebugResponse, DriverSyncRequest, DriverSyncResponse,
            LineupSyncRequest, LineupSyncResponse, StandingsSyncRequest, StandingsSyncResponse,
            TeamSyncRequest, TeamSyncResponse,
        },
    },
    services::{
        extract::SeasonExtractor,
        reconcile::{self, DriverBatch},
        standings::season_standings,
        ProviderError,
    },
    utils::state::AppState,
};

fn fetch_failed(e: ProviderError) -> Error {
    error!("Upstream fetch failed: {}", e);
    e.into()
}

fn store_failed(e: sqlx::Error) -> Error {
    error!("Database error during sync: {}", e);
    e.into()
}

/// Extraction is blocking, so it runs on the blocking pool.
async fn fetch_drivers(
    state: &Arc<AppState>,
    seasons: Vec<i32>,
    filter_confirmed: bool,
) -> Result<DriverBatch, Error> {
    let state = state.clone();
    tokio::task::spawn_blocking(move || {
        let extractor = SeasonExtractor::new(state.sessions.as_ref(), &state.reference);
        reconcile::sync_drivers(&extractor, &seasons, filter_confirmed)
    })
    .await?
    .map_err(fetch_failed)
}

/// Roster to deactivate against: only for a current or future target season
/// with filtering on, and only when one is configured.
fn deactivation_roster<'a>(state: &'a AppState, request: &DriverSyncRequest) -> Option<&'a ConfirmedRoster> {
    let reference = &state.reference;
    let target = request
        .season
        .or_else(|| request.seasons.as_ref().and_then(|seasons| seasons.first().copied()))
        .unwrap_or(reference.current_season);

    if target >= reference.current_season && request.filter_confirmed() {
        reference.roster_for(target)
    } else {
        None
    }
}

pub async fn sync_drivers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DriverSyncRequest>,
) -> Result<Json<DriverSyncResponse>, Error> {
    info!(
        "Starting driver sync - season: {:?}, seasons: {:?}, filter_confirmed: {:?}",
        request.season, request.seasons, request.filter_confirmed
    );
    let seasons = reconcile::seasons_to_sync(
        request.season,
        request.seasons.as_deref(),
        state.reference.current_season,
    );

    let batch = fetch_drivers(&state, seasons, request.filter_confirmed()).await?;
    if batch.drivers.is_empty() {
        return Ok(Json(DriverSyncResponse {
            success: false,
            message: "No drivers found to sync".to_string(),
            drivers_synced: 0,
            errors: None,
        }));
    }

    let outcome = state
        .store
        .sync_drivers(&batch.drivers, deactivation_roster(&state, &request))
        .await
        .map_err(store_failed)?;

    info!("Synced {} drivers", outcome.synced);
    Ok(Json(DriverSyncResponse {
        success: true,
        message: format!("Synced {} drivers", outcome.synced),
        drivers_synced: outcome.synced,
        errors: outcome.into_errors(),
    }))
}

/// Same fetch as `sync_drivers`, nothing written.
pub async fn debug_drivers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DriverSyncRequest>,
) -> Result<Json<DriverDebugResponse>, Error> {
    info!(
        "Starting debug driver fetch - season: {:?}, seasons: {:?}, filter_confirmed: {:?}",
        request.season, request.seasons, request.filter_confirmed
    );
    let seasons = reconcile::seasons_to_sync(
        request.season,
        request.seasons.as_deref(),
        state.reference.current_season,
    );

    let batch = fetch_drivers(&state, seasons, request.filter_confirmed()).await?;
    Ok(Json(DriverDebugResponse {
        success: true,
        message: "Raw session data (not saved to database)".to_string(),
        data: DriverDebugData {
            drivers: batch.drivers.clone(),
            seasons_processed: batch.seasons_processed,
        },
        drivers_count: batch.drivers.len(),
        drivers: batch.drivers,
        seasons_processed: batch.seasons_processed,
        request_params: request,
    }))
}

pub async fn sync_teams(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TeamSyncRequest>,
) -> Result<Json<TeamSyncResponse>, Error> {
    info!(
        "Starting team sync - season: {:?}, seasons: {:?}",
        request.season, request.seasons
    );
    let seasons = reconcile::seasons_to_sync(
        request.season,
        request.seasons.as_deref(),
        state.reference.current_season,
    );

    let worker = state.clone();
    let batch = tokio::task::spawn_blocking(move || {
        let extractor = SeasonExtractor::new(worker.sessions.as_ref(), &worker.reference);
        reconcile::sync_teams(&extractor, &seasons)
    })
    .await?
    .map_err(fetch_failed)?;

    info!(
        "Fetched {} teams from {} season(s)",
        batch.teams.len(),
        batch.seasons_processed
    );
    if batch.teams.is_empty() {
        return Ok(Json(TeamSyncResponse {
            success: false,
            message: "No teams found to sync".to_string(),
            teams_synced: 0,
            errors: None,
        }));
    }

    let outcome = state.store.sync_teams(&batch.teams).await.map_err(store_failed)?;

    info!("Synced {} teams", outcome.synced);
    Ok(Json(TeamSyncResponse {
        success: true,
        message: format!("Synced {} teams", outcome.synced),
        teams_synced: outcome.synced,
        errors: outcome.into_errors(),
    }))
}

pub async fn sync_lineups(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LineupSyncRequest>,
) -> Result<Json<LineupSyncResponse>, Error> {
    let season = request.season;
    info!("Starting lineup sync for season {}", season);

    let worker = state.clone();
    let lineups = tokio::task::spawn_blocking(move || {
        let extractor = SeasonExtractor::new(worker.sessions.as_ref(), &worker.reference);
        reconcile::season_lineups(&extractor, season)
    })
    .await?
    .map_err(|e| {
        error!("Failed to fetch lineup data: {}", e);
        Error::internal(&format!("Failed to fetch lineup data: {}", e))
    })?;

    if lineups.drivers.is_empty() && lineups.constructors.is_empty() {
        return Ok(Json(LineupSyncResponse {
            success: true,
            message: format!(
                "No lineup data available for season {}. Please ensure the season exists and drivers/constructors are available.",
                season
            ),
            drivers_synced: 0,
            constructors_synced: 0,
            errors: None,
        }));
    }

    let counts = state
        .store
        .replace_lineups(&lineups)
        .await
        .map_err(store_failed)?;

    Ok(Json(LineupSyncResponse {
        success: true,
        message: format!(
            "Synced {} drivers and {} constructors for season {}",
            counts.drivers, counts.constructors, season
        ),
        drivers_synced: counts.drivers,
        constructors_synced: counts.constructors,
        errors: None,
    }))
}

pub async fn sync_standings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StandingsSyncRequest>,
) -> Result<Json<StandingsSyncResponse>, Error> {
    let season = request.season;
    info!("Starting standings sync for season {}", season);

    let worker = state.clone();
    let (drivers, constructors) = tokio::task::spawn_blocking(move || {
        season_standings(worker.standings.as_ref(), &worker.reference.teams, season)
    })
    .await?
    .map_err(fetch_failed)?;

    if drivers.is_empty() && constructors.is_empty() {
        return Ok(Json(StandingsSyncResponse {
            success: false,
            message: format!("No standings found for season {}", season),
            driver_standings_synced: 0,
            constructor_standings_synced: 0,
            errors: None,
        }));
    }

    let (driver_outcome, constructor_outcome) = state
        .store
        .sync_standings(&drivers, &constructors)
        .await
        .map_err(store_failed)?;

    let mut errors = driver_outcome.errors;
    errors.extend(constructor_outcome.errors);
    Ok(Json(StandingsSyncResponse {
        success: true,
        message: format!(
            "Synced {} driver and {} constructor standings for season {}",
            driver_outcome.synced, constructor_outcome.synced, season
        ),
        driver_standings_synced: driver_outcome.synced,
        constructor_standings_synced: constructor_outcome.synced,
        errors: if errors.is_empty() { None } else { Some(errors) },
    }))
}
