use serde::{Deserialize, Serialize};

/// JSON document stored in `driver_season_lineups.lineup`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverLineup {
    pub teams: Vec<LineupTeam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupTeam {
    #[serde(rename = "teamName")]
    pub team_name: String,
    pub drivers: Vec<LineupDriver>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupDriver {
    #[serde(rename = "driverId")]
    pub driver_id: String,
    #[serde(rename = "driverNumber")]
    pub driver_number: Option<i32>,
}

impl DriverLineup {
    pub fn driver_count(&self) -> usize {
        self.teams.iter().map(|team| team.drivers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Both lineups of a season as written in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonLineups {
    pub season: i32,
    pub drivers: DriverLineup,
    pub constructors: Vec<String>,
}
