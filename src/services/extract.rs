use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::{
    models::{
        driver::DriverRecord,
        reference::{ConfirmedRoster, ReferenceData},
        session::{Event, FoundSession, SessionData, SESSION_PRIORITY},
        team::TeamRecord,
    },
    services::{ProviderError, SessionProvider},
    utils::normalize::{
        constructor_championships, constructor_id, driver_championships, is_driver_code,
        is_numeric_code, normalize_team_name, team_nationality,
    },
};

/// Pulls drivers and teams for a season out of whichever session the
/// provider has usable data for.
pub struct SeasonExtractor<'a> {
    provider: &'a dyn SessionProvider,
    reference: &'a ReferenceData,
}

impl<'a> SeasonExtractor<'a> {
    pub fn new(provider: &'a dyn SessionProvider, reference: &'a ReferenceData) -> Self {
        SeasonExtractor {
            provider,
            reference,
        }
    }

    /// Drivers of `season`. With `filter_confirmed`, current and future
    /// seasons are narrowed to that season's confirmed roster, including when
    /// the data had to come from an earlier season.
    pub fn drivers(
        &self,
        season: i32,
        filter_confirmed: bool,
    ) -> Result<Vec<DriverRecord>, ProviderError> {
        info!("Fetching drivers for season {}", season);

        let roster = if filter_confirmed && season >= self.reference.current_season {
            let roster = self.reference.roster_for(season);
            match roster {
                Some(roster) => info!(
                    "Filtering to {} confirmed {} race drivers: {:?}",
                    roster.len(),
                    season,
                    roster.codes()
                ),
                None => warn!(
                    "No confirmed roster configured for season {}, keeping every driver",
                    season
                ),
            }
            roster
        } else {
            None
        };

        let Some(found) = self.locate(season)? else {
            warn!("Could not fetch drivers for season {} - no data available", season);
            return Ok(Vec::new());
        };

        let drivers = self.drivers_from_session(&found.data, roster);
        info!(
            "Fetched {} drivers for season {} from {} {} {}. Teams extracted: {}",
            drivers.len(),
            season,
            found.season,
            found.event_name,
            found.kind,
            drivers.iter().filter(|d| d.current_team.is_some()).count()
        );
        Ok(drivers)
    }

    pub fn teams(&self, season: i32) -> Result<Vec<TeamRecord>, ProviderError> {
        info!("Fetching teams for season {}", season);

        let Some(found) = self.locate(season)? else {
            warn!("Could not fetch teams for season {} - no data available", season);
            return Ok(Vec::new());
        };

        let teams = self.teams_from_session(&found.data);
        info!(
            "Extracted {} teams from {} {} {}",
            teams.len(),
            found.season,
            found.event_name,
            found.kind
        );
        Ok(teams)
    }

    /// Finds a usable session for `season`. Current and future seasons step
    /// back one season at a time, down to the historical floor, until one
    /// has data.
    fn locate(&self, season: i32) -> Result<Option<FoundSession>, ProviderError> {
        let current = self.reference.current_season;
        let floor = self.reference.historical_floor;

        let mut year = season;
        loop {
            let schedule = self.provider.event_schedule(year)?;
            if schedule.is_empty() {
                warn!("No events found for season {}", year);
            } else if let Some(found) = self.find_best_session(year, &schedule) {
                return Ok(Some(found));
            } else {
                warn!("No valid session found with drivers for season {}", year);
            }

            if season < current || year <= floor {
                return Ok(None);
            }
            info!(
                "No usable data for season {}, trying previous season ({}) as fallback",
                year,
                year - 1
            );
            year -= 1;
        }
    }

    fn find_best_session(&self, season: i32, schedule: &[Event]) -> Option<FoundSession> {
        // Testing may be all there is before the opening round.
        let allow_testing = season >= self.reference.current_season;

        for event in schedule.iter().rev() {
            if !allow_testing && event.is_testing() {
                continue;
            }

            for kind in SESSION_PRIORITY {
                match self.provider.load_session(season, event, kind) {
                    Ok(data) if data.has_roster() && data.has_results() => {
                        info!(
                            "Found ideal session: {} {} with {} drivers",
                            event.name,
                            kind,
                            data.roster.len()
                        );
                        return Some(FoundSession {
                            season,
                            event_name: event.name.clone(),
                            kind,
                            data,
                        });
                    }
                    Ok(data) if data.has_roster() => {
                        debug!(
                            "Found session with drivers but no results: {} {}",
                            event.name, kind
                        );
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Could not load {} {}: {}", event.name, kind, e),
                }
            }
        }

        warn!(
            "No completed session with results found for {}, trying first event",
            season
        );
        let first = schedule.first()?;
        for kind in SESSION_PRIORITY {
            match self.provider.load_session(season, first, kind) {
                Ok(data) if data.has_roster() => {
                    info!(
                        "Using fallback session: {} {} with {} drivers",
                        first.name,
                        kind,
                        data.roster.len()
                    );
                    return Some(FoundSession {
                        season,
                        event_name: first.name.clone(),
                        kind,
                        data,
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("Fallback session {} {} failed: {}", first.name, kind, e),
            }
        }

        None
    }

    fn drivers_from_session(
        &self,
        data: &SessionData,
        roster: Option<&ConfirmedRoster>,
    ) -> Vec<DriverRecord> {
        let mut team_by_code: HashMap<String, String> = HashMap::new();
        let mut number_by_code: HashMap<String, i32> = HashMap::new();
        let mut code_by_number: HashMap<i32, String> = HashMap::new();

        for row in &data.results {
            let Some(code) = clean_code(row.abbreviation.as_deref()) else {
                continue;
            };
            if let Some(team) = row.team_name.as_deref().filter(|t| !t.is_empty()) {
                team_by_code.insert(code.clone(), team.to_string());
            }
            if let Some(number) = row.driver_number {
                number_by_code.insert(code.clone(), number);
                code_by_number.insert(number, code);
            }
        }
        debug!("Abbreviation mapping from results: {:?}", number_by_code);

        // Entry list fills whatever the classification left out.
        for entry in &data.roster {
            let Some(code) = clean_code(entry.abbreviation.as_deref()) else {
                continue;
            };
            if let Some(team) = entry.team_name.as_deref().filter(|t| !t.is_empty()) {
                team_by_code.entry(code.clone()).or_insert_with(|| team.to_string());
            }
            if let Some(number) = entry.driver_number {
                code_by_number.entry(number).or_insert(code);
            }
        }

        let mut candidates: Vec<String> = Vec::new();
        for row in &data.results {
            if let Some(code) = clean_code(row.abbreviation.as_deref()) {
                candidates.push(code);
            } else if let Some(code) = row.driver_number.and_then(|n| code_by_number.get(&n)) {
                if !candidates.contains(code) {
                    candidates.push(code.clone());
                }
            }
        }
        if candidates.is_empty() {
            warn!("No abbreviations found in results, using entry list identifiers");
            candidates = data
                .roster
                .iter()
                .map(|entry| entry.identifier.clone())
                .collect();
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut drivers = Vec::new();

        for candidate in candidates {
            let mut code = candidate.trim().to_uppercase();

            if is_numeric_code(&code) {
                match code.parse::<i32>().ok().and_then(|n| code_by_number.get(&n)) {
                    Some(mapped) => code = mapped.clone(),
                    None => {
                        warn!("Driver number {} not found in abbreviation map, skipping", code);
                        continue;
                    }
                }
            }

            if !is_driver_code(&code) {
                debug!("Skipping invalid driver code format: {}", code);
                continue;
            }

            if !seen.insert(code.clone()) {
                debug!("Skipping duplicate driver code: {}", code);
                continue;
            }

            if roster.is_some_and(|roster| !roster.contains(&code)) {
                debug!("Filtering out unconfirmed/test driver: {}", code);
                continue;
            }

            let number = number_by_code.get(&code).copied();
            let Some(info) = data
                .driver(&code)
                .or_else(|| number.and_then(|n| data.driver_by_number(n)))
            else {
                warn!("Driver {} is classified but missing from the entry list, skipping", code);
                continue;
            };

            let current_team = team_by_code
                .get(&code)
                .map(|team| normalize_team_name(&self.reference.teams, team));

            drivers.push(DriverRecord {
                driver_id: code.to_lowercase(),
                forename: info.first_name.clone(),
                surname: info.last_name.clone(),
                nationality: info.country_code.clone(),
                permanent_number: number.or(info.driver_number),
                driver_championships: driver_championships(
                    &self.reference.driver_championships,
                    &info.last_name,
                ),
                constructor_championships: constructor_championships(
                    &info.last_name,
                    current_team.as_deref().unwrap_or(""),
                ),
                current_team,
                is_active: true,
                code,
            });
        }

        drivers
    }

    fn teams_from_session(&self, data: &SessionData) -> Vec<TeamRecord> {
        let from_results: Vec<&str> = data
            .results
            .iter()
            .filter_map(|row| row.team_name.as_deref())
            .filter(|team| !team.is_empty())
            .collect();
        let names = if from_results.is_empty() {
            debug!("No team names in results, using entry list");
            data.roster
                .iter()
                .filter_map(|entry| entry.team_name.as_deref())
                .filter(|team| !team.is_empty())
                .collect()
        } else {
            from_results
        };

        let catalog = &self.reference.teams;
        let mut seen: HashSet<String> = HashSet::new();
        let mut teams = Vec::new();
        for name in names {
            let canonical = normalize_team_name(catalog, name);
            let id = constructor_id(catalog, &canonical);
            if id.is_empty() || !seen.insert(id.clone()) {
                continue;
            }
            teams.push(TeamRecord {
                constructor_id: id,
                nationality: team_nationality(catalog, &canonical),
                name: canonical,
            });
        }
        teams
    }
}

fn clean_code(raw: Option<&str>) -> Option<String> {
    raw.map(|code| code.trim().to_uppercase())
        .filter(|code| is_driver_code(code))
}
