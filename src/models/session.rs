use serde::{Deserialize, Serialize};
use std::fmt;

/// Session types in the order they are probed when looking for a usable
/// roster: race results carry the most reliable team data.
pub const SESSION_PRIORITY: [SessionKind; 5] = [
    SessionKind::Race,
    SessionKind::Qualifying,
    SessionKind::ThirdPractice,
    SessionKind::SecondPractice,
    SessionKind::FirstPractice,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    Race,
    Qualifying,
    ThirdPractice,
    SecondPractice,
    FirstPractice,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::Race => "R",
            SessionKind::Qualifying => "Q",
            SessionKind::ThirdPractice => "FP3",
            SessionKind::SecondPractice => "FP2",
            SessionKind::FirstPractice => "FP1",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of a season's event schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub key: i64,
    pub name: String,
    pub date_start: Option<String>,
}

impl Event {
    pub fn is_testing(&self) -> bool {
        self.name.contains("Testing") || self.name.contains("Test") || self.name.contains("Shakedown")
    }
}

/// A driver as listed by the session's entry list. `identifier` is whatever
/// the upstream uses to key the driver, usually the car number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub identifier: String,
    pub abbreviation: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub country_code: String,
    pub driver_number: Option<i32>,
    pub team_name: Option<String>,
}

/// A classified result row. Any field may be missing depending on how far
/// the session got.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub abbreviation: Option<String>,
    pub team_name: Option<String>,
    pub driver_number: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub roster: Vec<RosterEntry>,
    pub results: Vec<ResultRow>,
}

impl SessionData {
    pub fn has_roster(&self) -> bool {
        !self.roster.is_empty()
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// Looks a driver up the way the entry list allows: by abbreviation
    /// first, then by the raw identifier.
    pub fn driver(&self, code: &str) -> Option<&RosterEntry> {
        self.roster
            .iter()
            .find(|entry| {
                entry
                    .abbreviation
                    .as_deref()
                    .is_some_and(|abbrev| abbrev.trim().eq_ignore_ascii_case(code))
            })
            .or_else(|| self.roster.iter().find(|entry| entry.identifier == code))
    }

    pub fn driver_by_number(&self, number: i32) -> Option<&RosterEntry> {
        self.roster.iter().find(|entry| {
            entry.driver_number == Some(number) || entry.identifier == number.to_string()
        })
    }
}

/// The session picked for a season, with where it came from.
#[derive(Debug, Clone)]
pub struct FoundSession {
    pub season: i32,
    pub event_name: String,
    pub kind: SessionKind,
    pub data: SessionData,
}
