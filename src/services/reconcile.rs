use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::{
    models::{
        driver::DriverRecord,
        lineup::{DriverLineup, LineupDriver, LineupTeam, SeasonLineups},
        team::TeamRecord,
    },
    services::{extract::SeasonExtractor, ProviderError},
};

const UNKNOWN_TEAM: &str = "Unknown";

/// The seasons a request covers, newest first. A single `season` wins over
/// `seasons`; with neither, the current season.
pub fn seasons_to_sync(season: Option<i32>, seasons: Option<&[i32]>, current: i32) -> Vec<i32> {
    let mut selected = match (season, seasons) {
        (Some(season), _) => vec![season],
        (None, Some(seasons)) if !seasons.is_empty() => seasons.to_vec(),
        _ => vec![current],
    };
    selected.sort_unstable_by(|a, b| b.cmp(a));
    selected.dedup();
    selected
}

#[derive(Debug, Default)]
pub struct DriverBatch {
    pub drivers: Vec<DriverRecord>,
    pub seasons_processed: usize,
}

#[derive(Debug, Default)]
pub struct TeamBatch {
    pub teams: Vec<TeamRecord>,
    pub seasons_processed: usize,
}

/// Drivers across `seasons`, one record per code. Seasons are visited newest
/// first so the most recent record of a driver is the one kept.
pub fn sync_drivers(
    extractor: &SeasonExtractor,
    seasons: &[i32],
    filter_confirmed: bool,
) -> Result<DriverBatch, ProviderError> {
    let mut ordered = seasons.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    let mut seen: HashSet<String> = HashSet::new();
    let mut drivers = Vec::new();
    for season in ordered {
        for driver in extractor.drivers(season, filter_confirmed)? {
            if seen.insert(driver.code.clone()) {
                drivers.push(driver);
            } else {
                debug!("Driver {} already taken from a later season", driver.code);
            }
        }
    }

    info!(
        "Collected {} unique drivers from {} season(s)",
        drivers.len(),
        seasons.len()
    );
    Ok(DriverBatch {
        drivers,
        seasons_processed: seasons.len(),
    })
}

pub fn sync_teams(extractor: &SeasonExtractor, seasons: &[i32]) -> Result<TeamBatch, ProviderError> {
    let mut ordered = seasons.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    let mut seen: HashSet<String> = HashSet::new();
    let mut teams = Vec::new();
    for season in ordered {
        for team in extractor.teams(season)? {
            if seen.insert(team.constructor_id.clone()) {
                teams.push(team);
            }
        }
    }

    info!(
        "Collected {} unique teams from {} season(s)",
        teams.len(),
        seasons.len()
    );
    Ok(TeamBatch {
        teams,
        seasons_processed: seasons.len(),
    })
}

/// Groups drivers under their team, teams ordered by name. Drivers keep the
/// order they were extracted in.
pub fn build_driver_lineup(drivers: &[DriverRecord]) -> DriverLineup {
    let mut by_team: BTreeMap<&str, Vec<LineupDriver>> = BTreeMap::new();
    for driver in drivers {
        let team = driver
            .current_team
            .as_deref()
            .filter(|team| !team.is_empty())
            .unwrap_or(UNKNOWN_TEAM);
        by_team.entry(team).or_default().push(LineupDriver {
            driver_id: driver.driver_id.clone(),
            driver_number: driver.permanent_number,
        });
    }

    DriverLineup {
        teams: by_team
            .into_iter()
            .map(|(team_name, drivers)| LineupTeam {
                team_name: team_name.to_string(),
                drivers,
            })
            .collect(),
    }
}

/// Lineups describe who actually raced, so the confirmed roster is not
/// applied here.
pub fn season_lineups(extractor: &SeasonExtractor, season: i32) -> Result<SeasonLineups, ProviderError> {
    let drivers = extractor.drivers(season, false)?;
    let teams = extractor.teams(season)?;

    let lineups = SeasonLineups {
        season,
        drivers: build_driver_lineup(&drivers),
        constructors: teams.into_iter().map(|team| team.constructor_id).collect(),
    };
    info!(
        "Built {} lineup: {} drivers in {} teams, {} constructors",
        season,
        lineups.drivers.driver_count(),
        lineups.drivers.teams.len(),
        lineups.constructors.len()
    );
    Ok(lineups)
}
