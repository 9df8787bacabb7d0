use serde::{Deserialize, Serialize};

use crate::models::driver::DriverRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverSyncRequest {
    pub seasons: Option<Vec<i32>>,
    /// Takes precedence over `seasons`.
    pub season: Option<i32>,
    pub filter_confirmed: Option<bool>,
}

impl DriverSyncRequest {
    pub fn filter_confirmed(&self) -> bool {
        self.filter_confirmed.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamSyncRequest {
    pub seasons: Option<Vec<i32>>,
    pub season: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupSyncRequest {
    pub season: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsSyncRequest {
    pub season: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSyncResponse {
    pub success: bool,
    pub message: String,
    pub drivers_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSyncResponse {
    pub success: bool,
    pub message: String,
    pub teams_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupSyncResponse {
    pub success: bool,
    pub message: String,
    pub drivers_synced: usize,
    pub constructors_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsSyncResponse {
    pub success: bool,
    pub message: String,
    pub driver_standings_synced: usize,
    pub constructor_standings_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDebugData {
    pub drivers: Vec<DriverRecord>,
    pub seasons_processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDebugResponse {
    pub success: bool,
    pub message: String,
    pub data: DriverDebugData,
    pub drivers_count: usize,
    pub drivers: Vec<DriverRecord>,
    pub seasons_processed: usize,
    pub request_params: DriverSyncRequest,
}

/// Counts of a batch write. Per-record failures end up in `errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub synced: usize,
    pub errors: Vec<String>,
}

impl WriteOutcome {
    pub fn into_errors(self) -> Option<Vec<String>> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors)
        }
    }
}
