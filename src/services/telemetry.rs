use serde::Deserialize;
use tracing::debug;

use crate::{
    models::session::{Event, ResultRow, RosterEntry, SessionData, SessionKind},
    services::{http::JsonFetcher, ProviderError},
    utils::race_utils::map_session_name,
};

/// Source of per-event entry lists and classifications. Calls block; run
/// them on a blocking thread.
pub trait SessionProvider: Send + Sync {
    /// Events of a season, oldest first.
    fn event_schedule(&self, season: i32) -> Result<Vec<Event>, ProviderError>;

    fn load_session(
        &self,
        season: i32,
        event: &Event,
        kind: SessionKind,
    ) -> Result<SessionData, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct Meeting {
    meeting_key: i64,
    meeting_name: Option<String>,
    meeting_official_name: Option<String>,
    date_start: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Session {
    session_key: i64,
    session_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenF1Driver {
    pub driver_number: Option<i32>,
    pub name_acronym: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub country_code: Option<String>,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenF1Result {
    pub driver_number: Option<i32>,
    pub position: Option<i32>,
}

/// OpenF1 REST API (`/meetings`, `/sessions`, `/drivers`, `/session_result`).
pub struct OpenF1Provider {
    fetcher: JsonFetcher,
    base_url: String,
}

impl OpenF1Provider {
    pub fn new(fetcher: JsonFetcher, base_url: &str) -> Self {
        OpenF1Provider {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SessionProvider for OpenF1Provider {
    fn event_schedule(&self, season: i32) -> Result<Vec<Event>, ProviderError> {
        let meetings: Vec<Meeting> = self
            .fetcher
            .get_list(&format!("{}/meetings?year={}", self.base_url, season))?;

        let mut events: Vec<Event> = meetings
            .into_iter()
            .map(|meeting| Event {
                key: meeting.meeting_key,
                name: meeting
                    .meeting_name
                    .or(meeting.meeting_official_name)
                    .unwrap_or_else(|| meeting.meeting_key.to_string()),
                date_start: meeting.date_start,
            })
            .collect();
        // ISO-8601 timestamps order lexically.
        events.sort_by(|a, b| a.date_start.cmp(&b.date_start));
        Ok(events)
    }

    fn load_session(
        &self,
        season: i32,
        event: &Event,
        kind: SessionKind,
    ) -> Result<SessionData, ProviderError> {
        let sessions: Vec<Session> = self
            .fetcher
            .get_list(&format!("{}/sessions?meeting_key={}", self.base_url, event.key))?;

        let session = sessions
            .into_iter()
            .find(|session| map_session_name(&session.session_name) == Some(kind))
            .ok_or_else(|| ProviderError::SessionNotFound {
                season,
                event: event.name.clone(),
                kind,
            })?;
        debug!(
            "Loading {} {} {} (session_key {})",
            season, event.name, kind, session.session_key
        );

        let drivers: Vec<OpenF1Driver> = self.fetcher.get_list(&format!(
            "{}/drivers?session_key={}",
            self.base_url, session.session_key
        ))?;
        let results: Vec<OpenF1Result> = self.fetcher.get_list(&format!(
            "{}/session_result?session_key={}",
            self.base_url, session.session_key
        ))?;

        Ok(assemble_session(drivers, results))
    }
}

/// Joins the classification onto the entry list. OpenF1 results only carry
/// car numbers, so codes and teams come from the matching driver entry.
pub fn assemble_session(drivers: Vec<OpenF1Driver>, mut results: Vec<OpenF1Result>) -> SessionData {
    results.sort_by_key(|result| result.position.unwrap_or(i32::MAX));

    let results = results
        .into_iter()
        .map(|result| {
            let driver = result
                .driver_number
                .and_then(|number| drivers.iter().find(|d| d.driver_number == Some(number)));
            ResultRow {
                abbreviation: driver.and_then(|d| d.name_acronym.clone()),
                team_name: driver.and_then(|d| d.team_name.clone()),
                driver_number: result.driver_number,
            }
        })
        .collect();

    let roster = drivers
        .into_iter()
        .map(|driver| RosterEntry {
            identifier: driver
                .driver_number
                .map(|number| number.to_string())
                .or_else(|| driver.name_acronym.clone())
                .unwrap_or_default(),
            abbreviation: driver.name_acronym,
            first_name: driver.first_name.unwrap_or_default(),
            last_name: driver.last_name.unwrap_or_default(),
            country_code: driver.country_code.unwrap_or_default(),
            driver_number: driver.driver_number,
            team_name: driver.team_name,
        })
        .collect();

    SessionData { roster, results }
}

#[cfg(test)]
pub mod fake {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use super::*;

    /// In-memory provider: seasons, events and sessions registered up front.
    #[derive(Default)]
    pub struct FakeSessionProvider {
        schedules: HashMap<i32, Vec<Event>>,
        sessions: HashMap<(i32, String, SessionKind), SessionData>,
        failing: HashSet<i32>,
        schedule_calls: Mutex<Vec<i32>>,
    }

    impl FakeSessionProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_event(mut self, season: i32, name: &str) -> Self {
            let events = self.schedules.entry(season).or_default();
            if !events.iter().any(|event| event.name == name) {
                let key = season as i64 * 100 + events.len() as i64;
                events.push(Event {
                    key,
                    name: name.to_string(),
                    date_start: None,
                });
            }
            self
        }

        pub fn with_session(
            self,
            season: i32,
            event: &str,
            kind: SessionKind,
            data: SessionData,
        ) -> Self {
            let mut this = self.with_event(season, event);
            this.sessions.insert((season, event.to_string(), kind), data);
            this
        }

        /// Schedule lookups for `season` fail like a network error.
        pub fn failing(mut self, season: i32) -> Self {
            self.failing.insert(season);
            self
        }

        pub fn schedule_calls(&self) -> Vec<i32> {
            self.schedule_calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    impl SessionProvider for FakeSessionProvider {
        fn event_schedule(&self, season: i32) -> Result<Vec<Event>, ProviderError> {
            if let Ok(mut calls) = self.schedule_calls.lock() {
                calls.push(season);
            }
            if self.failing.contains(&season) {
                return Err(ProviderError::Unavailable(format!(
                    "schedule for {season} timed out"
                )));
            }
            Ok(self.schedules.get(&season).cloned().unwrap_or_default())
        }

        fn load_session(
            &self,
            season: i32,
            event: &Event,
            kind: SessionKind,
        ) -> Result<SessionData, ProviderError> {
            self.sessions
                .get(&(season, event.name.clone(), kind))
                .cloned()
                .ok_or_else(|| ProviderError::SessionNotFound {
                    season,
                    event: event.name.clone(),
                    kind,
                })
        }
    }

    pub fn entry(number: i32, code: &str, first: &str, last: &str, team: &str) -> RosterEntry {
        RosterEntry {
            identifier: number.to_string(),
            abbreviation: Some(code.to_string()),
            first_name: first.to_string(),
            last_name: last.to_string(),
            country_code: "GBR".to_string(),
            driver_number: Some(number),
            team_name: Some(team.to_string()),
        }
    }

    pub fn result(code: &str, number: i32, team: &str) -> ResultRow {
        ResultRow {
            abbreviation: Some(code.to_string()),
            team_name: Some(team.to_string()),
            driver_number: Some(number),
        }
    }

    /// A classified session: every driver listed and classified, in order.
    pub fn classified(drivers: &[(i32, &str, &str, &str, &str)]) -> SessionData {
        SessionData {
            roster: drivers
                .iter()
                .map(|(number, code, first, last, team)| entry(*number, code, first, last, team))
                .collect(),
            results: drivers
                .iter()
                .map(|(number, code, _, _, team)| result(code, *number, team))
                .collect(),
        }
    }

    /// Entry list only, as before a session has run.
    pub fn entry_list(drivers: &[(i32, &str, &str, &str, &str)]) -> SessionData {
        SessionData {
            results: Vec::new(),
            ..classified(drivers)
        }
    }
}
