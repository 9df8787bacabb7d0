use serde::{Deserialize, Serialize};

/// A driver as extracted from a session, ready to be written to `drivers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    /// Lowercase 3-letter code; the natural key.
    pub driver_id: String,
    pub code: String,
    pub forename: String,
    pub surname: String,
    pub nationality: String,
    pub permanent_number: Option<i32>,
    pub current_team: Option<String>,
    pub is_active: bool,
    pub driver_championships: i32,
    pub constructor_championships: i32,
}
