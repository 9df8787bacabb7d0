use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    models::{
        reference::TeamCatalog,
        standing::{ConstructorStanding, DriverStanding},
    },
    services::{http::JsonFetcher, ProviderError},
    utils::normalize::{constructor_id, is_driver_code},
};

/// One line of a championship table after a given round.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingRow {
    pub round: i32,
    /// Upstream id (`driverId` / `constructorId`).
    pub entity_id: String,
    pub code: Option<String>,
    pub name: String,
    pub position: i32,
    pub points: f64,
    pub wins: i32,
}

/// Source of per-round championship tables. Calls block.
pub trait StandingsProvider: Send + Sync {
    /// Rounds of `season` that have been scheduled, in order.
    fn rounds(&self, season: i32) -> Result<Vec<i32>, ProviderError>;

    fn driver_standings(&self, season: i32, round: i32) -> Result<Vec<StandingRow>, ProviderError>;

    fn constructor_standings(
        &self,
        season: i32,
        round: i32,
    ) -> Result<Vec<StandingRow>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ErgastRace {
    round: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErgastDriver {
    driver_id: String,
    code: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErgastConstructor {
    constructor_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErgastDriverStanding {
    #[serde(rename = "position")]
    position: Option<String>,
    #[serde(rename = "points")]
    points: String,
    #[serde(rename = "wins")]
    wins: String,
    driver: ErgastDriver,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErgastConstructorStanding {
    #[serde(rename = "position")]
    position: Option<String>,
    #[serde(rename = "points")]
    points: String,
    #[serde(rename = "wins")]
    wins: String,
    constructor: ErgastConstructor,
}

/// Jolpica's Ergast-compatible API.
pub struct ErgastProvider {
    fetcher: JsonFetcher,
    base_url: String,
}

impl ErgastProvider {
    pub fn new(fetcher: JsonFetcher, base_url: &str) -> Self {
        ErgastProvider {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn standings_list(&self, season: i32, round: i32, table: &str) -> Result<Value, ProviderError> {
        let res = self.fetcher.get_json(&format!(
            "{}/{season}/{round}/{table}/?format=json&limit=100",
            self.base_url
        ))?;
        Ok(res["MRData"]["StandingsTable"]["StandingsLists"][0].clone())
    }
}

impl StandingsProvider for ErgastProvider {
    fn rounds(&self, season: i32) -> Result<Vec<i32>, ProviderError> {
        let res = self.fetcher.get_json(&format!(
            "{}/{season}/races/?format=json&limit=100",
            self.base_url
        ))?;
        let races: Vec<ErgastRace> = match &res["MRData"]["RaceTable"]["Races"] {
            Value::Null => Vec::new(),
            races => serde_json::from_value(races.clone())?,
        };
        Ok(races
            .into_iter()
            .filter_map(|race| race.round.parse().ok())
            .collect())
    }

    fn driver_standings(&self, season: i32, round: i32) -> Result<Vec<StandingRow>, ProviderError> {
        let list = self.standings_list(season, round, "driverstandings")?;
        let standings: Vec<ErgastDriverStanding> = match &list["DriverStandings"] {
            Value::Null => Vec::new(),
            rows => serde_json::from_value(rows.clone())?,
        };

        Ok(standings
            .into_iter()
            .filter_map(|s| {
                let name = format!(
                    "{} {}",
                    s.driver.given_name.as_deref().unwrap_or_default(),
                    s.driver.family_name.as_deref().unwrap_or_default()
                );
                parse_row(
                    round,
                    s.driver.driver_id,
                    s.driver.code,
                    name.trim().to_string(),
                    s.position,
                    &s.points,
                    &s.wins,
                )
            })
            .collect())
    }

    fn constructor_standings(
        &self,
        season: i32,
        round: i32,
    ) -> Result<Vec<StandingRow>, ProviderError> {
        let list = self.standings_list(season, round, "constructorstandings")?;
        let standings: Vec<ErgastConstructorStanding> = match &list["ConstructorStandings"] {
            Value::Null => Vec::new(),
            rows => serde_json::from_value(rows.clone())?,
        };

        Ok(standings
            .into_iter()
            .filter_map(|s| {
                parse_row(
                    round,
                    s.constructor.constructor_id,
                    None,
                    s.constructor.name,
                    s.position,
                    &s.points,
                    &s.wins,
                )
            })
            .collect())
    }
}

/// Ergast sends every number as a string. Unclassified entries have no
/// position and are left out.
fn parse_row(
    round: i32,
    entity_id: String,
    code: Option<String>,
    name: String,
    position: Option<String>,
    points: &str,
    wins: &str,
) -> Option<StandingRow> {
    let parsed = (
        position.as_deref().and_then(|p| p.parse::<i32>().ok()),
        points.parse::<f64>().ok(),
        wins.parse::<i32>().ok(),
    );
    match parsed {
        (Some(position), Some(points), Some(wins)) => Some(StandingRow {
            round,
            entity_id,
            code,
            name,
            position,
            points,
            wins,
        }),
        _ => {
            warn!("Skipping unparseable standing for {} after round {}", entity_id, round);
            None
        }
    }
}

/// Drivers are keyed like the `drivers` table: lowercase 3-letter code, or
/// the upstream id for drivers that never had one.
pub fn driver_standings_for(season: i32, rows: Vec<StandingRow>) -> Vec<DriverStanding> {
    rows.into_iter()
        .map(|row| {
            let driver_id = match row.code.as_deref().map(str::trim) {
                Some(code) if is_driver_code(code) => code.to_lowercase(),
                _ => row.entity_id.to_lowercase(),
            };
            DriverStanding {
                season,
                round: row.round,
                driver_id,
                position: row.position,
                points: row.points,
                wins: row.wins,
            }
        })
        .collect()
}

/// Constructors are keyed by the canonical id so standings line up with the
/// `constructors` table regardless of the sponsor name that season.
pub fn constructor_standings_for(
    catalog: &TeamCatalog,
    season: i32,
    rows: Vec<StandingRow>,
) -> Vec<ConstructorStanding> {
    rows.into_iter()
        .map(|row| {
            let id = constructor_id(catalog, &row.name);
            ConstructorStanding {
                season,
                round: row.round,
                constructor_id: if id.is_empty() { row.entity_id } else { id },
                position: row.position,
                points: row.points,
                wins: row.wins,
            }
        })
        .collect()
}

/// Every round's tables for `season`.
pub fn season_standings(
    provider: &dyn StandingsProvider,
    catalog: &TeamCatalog,
    season: i32,
) -> Result<(Vec<DriverStanding>, Vec<ConstructorStanding>), ProviderError> {
    let rounds = provider.rounds(season)?;
    info!("Fetching standings for {} round(s) of {}", rounds.len(), season);

    let mut drivers = Vec::new();
    let mut constructors = Vec::new();
    for round in rounds {
        let driver_rows = provider.driver_standings(season, round)?;
        if driver_rows.is_empty() {
            // Rounds still to be run have no table yet.
            info!("No standings after round {} of {}, stopping", round, season);
            break;
        }
        drivers.extend(driver_standings_for(season, driver_rows));
        constructors.extend(constructor_standings_for(
            catalog,
            season,
            provider.constructor_standings(season, round)?,
        ));
    }

    Ok((drivers, constructors))
}


#[cfg(test)]
mod tests {
    use super::fake::{row, FakeStandingsProvider};
    use super::*;
    use crate::models::reference::ReferenceData;
    use serde_json::json;

    #[test]
    fn ergast_rows_parse_string_numbers() {
        let raw = json!([
            {"position": "1", "positionText": "1", "points": "437", "wins": "9",
             "Driver": {"driverId": "max_verstappen", "code": "VER",
                        "givenName": "Max", "familyName": "Verstappen"}},
            {"positionText": "-", "points": "0", "wins": "0",
             "Driver": {"driverId": "bearman", "givenName": "Oliver", "familyName": "Bearman"}}
        ]);
        let standings: Vec<ErgastDriverStanding> = serde_json::from_value(raw).unwrap();

        let rows: Vec<StandingRow> = standings
            .into_iter()
            .filter_map(|s| {
                parse_row(24, s.driver.driver_id, s.driver.code, String::new(), s.position, &s.points, &s.wins)
            })
            .collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "max_verstappen");
        assert_eq!(rows[0].points, 437.0);
        assert_eq!(rows[0].wins, 9);
    }

    #[test]
    fn driver_ids_follow_the_drivers_table() {
        let standings = driver_standings_for(
            2024,
            vec![
                row(1, "max_verstappen", Some("VER"), "Max Verstappen", 1, 26.0),
                row(1, "kubica", None, "Robert Kubica", 20, 0.0),
            ],
        );
        assert_eq!(standings[0].driver_id, "ver");
        assert_eq!(standings[1].driver_id, "kubica");
    }

    #[test]
    fn constructor_ids_are_canonical() {
        let reference = ReferenceData::builtin().unwrap();
        let standings = constructor_standings_for(
            &reference.teams,
            2024,
            vec![
                row(3, "sauber", None, "Sauber", 10, 0.0),
                row(3, "haas", None, "Haas F1 Team", 7, 4.0),
            ],
        );
        assert_eq!(standings[0].constructor_id, "audi");
        assert_eq!(standings[1].constructor_id, "haas");
    }

    #[test]
    fn stops_at_first_round_without_a_table() {
        let provider = FakeStandingsProvider::new()
            .with_round(
                2025,
                1,
                vec![row(1, "norris", Some("NOR"), "Lando Norris", 1, 25.0)],
                vec![row(1, "mclaren", None, "McLaren", 1, 43.0)],
            )
            .with_round(2025, 2, Vec::new(), Vec::new())
            .with_round(
                2025,
                3,
                vec![row(3, "norris", Some("NOR"), "Lando Norris", 1, 70.0)],
                Vec::new(),
            );
        let reference = ReferenceData::builtin().unwrap();

        let (drivers, constructors) = season_standings(&provider, &reference.teams, 2025).unwrap();

        assert_eq!(drivers.len(), 1);
        assert_eq!(constructors.len(), 1);
        assert_eq!(constructors[0].constructor_id, "mclaren");
    }
}
