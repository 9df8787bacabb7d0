use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
};
use thiserror::Error;

use crate::utils::normalize::{is_driver_code, normalize_team_name};

const BUILTIN_REFERENCE: &str = include_str!("../../config/reference.json");

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("could not read reference data: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse reference data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid reference data: {0}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct RawTeamCatalog {
    aliases: HashMap<String, String>,
    roots: Vec<(String, String)>,
    #[serde(default)]
    nationalities: HashMap<String, String>,
}

/// Known team name spellings and the canonical vocabulary they map to.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawTeamCatalog")]
pub struct TeamCatalog {
    aliases: HashMap<String, String>,
    lowered: HashMap<String, String>,
    roots: Vec<(String, String)>,
    nationalities: HashMap<String, String>,
}

impl From<RawTeamCatalog> for TeamCatalog {
    fn from(raw: RawTeamCatalog) -> Self {
        let lowered = raw
            .aliases
            .iter()
            .map(|(alias, canonical)| (alias.to_lowercase(), canonical.clone()))
            .collect();
        let roots = raw
            .roots
            .into_iter()
            .map(|(token, canonical)| (token.to_lowercase(), canonical))
            .collect();
        TeamCatalog {
            aliases: raw.aliases,
            lowered,
            roots,
            nationalities: raw.nationalities,
        }
    }
}

impl TeamCatalog {
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn alias_ignore_case(&self, lowered_name: &str) -> Option<&str> {
        self.lowered.get(lowered_name).map(String::as_str)
    }

    /// Root tokens in match order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, &str)> {
        self.roots
            .iter()
            .map(|(token, canonical)| (token.as_str(), canonical.as_str()))
    }

    pub fn nationality(&self, canonical: &str) -> Option<&str> {
        self.nationalities.get(canonical).map(String::as_str)
    }

    fn canonical_names(&self) -> HashSet<&str> {
        self.aliases
            .values()
            .chain(self.roots.iter().map(|(_, canonical)| canonical))
            .map(String::as_str)
            .collect()
    }
}

/// Upper-cased driver codes racing in a season.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct ConfirmedRoster(HashSet<String>);

impl From<Vec<String>> for ConfirmedRoster {
    fn from(codes: Vec<String>) -> Self {
        ConfirmedRoster(codes.into_iter().map(|c| c.trim().to_uppercase()).collect())
    }
}

impl ConfirmedRoster {
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(&code.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes in a stable order, for logging and SQL binds.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.0.iter().cloned().collect();
        codes.sort();
        codes
    }
}

/// Static lookup tables consulted during a sync. Loaded once at startup and
/// shared read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceData {
    pub current_season: i32,
    pub historical_floor: i32,
    pub teams: TeamCatalog,
    #[serde(default)]
    pub confirmed_rosters: BTreeMap<i32, ConfirmedRoster>,
    #[serde(default)]
    pub driver_championships: HashMap<String, i32>,
}

impl ReferenceData {
    pub fn builtin() -> Result<Self, ReferenceError> {
        Self::parse(BUILTIN_REFERENCE)
    }

    pub fn from_file(path: &Path) -> Result<Self, ReferenceError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ReferenceError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    fn parse(raw: &str) -> Result<Self, ReferenceError> {
        let data: ReferenceData = serde_json::from_str(raw)?;
        data.validate()?;
        Ok(data)
    }

    pub fn with_current_season(mut self, season: i32) -> Self {
        self.current_season = season;
        self
    }

    /// The roster in force for `season`: the newest one configured at or
    /// before it.
    pub fn roster_for(&self, season: i32) -> Option<&ConfirmedRoster> {
        self.confirmed_rosters
            .range(..=season)
            .next_back()
            .map(|(_, roster)| roster)
    }

    pub fn validate(&self) -> Result<(), ReferenceError> {
        if self.historical_floor > self.current_season {
            return Err(ReferenceError::Invalid(format!(
                "historical floor {} is after current season {}",
                self.historical_floor, self.current_season
            )));
        }

        // Normalization has to be idempotent, so every canonical name must map
        // onto itself.
        for canonical in self.teams.canonical_names() {
            let renormalized = normalize_team_name(&self.teams, canonical);
            if renormalized != canonical {
                return Err(ReferenceError::Invalid(format!(
                    "canonical team name {canonical:?} normalizes to {renormalized:?}"
                )));
            }
        }

        for (season, roster) in &self.confirmed_rosters {
            if roster.is_empty() {
                return Err(ReferenceError::Invalid(format!("roster {season} is empty")));
            }
            if let Some(code) = roster.0.iter().find(|code| !is_driver_code(code)) {
                return Err(ReferenceError::Invalid(format!(
                    "roster {season} contains invalid driver code {code:?}"
                )));
            }
        }

        Ok(())
    }
}
