use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub constructor_id: String,
    pub name: String,
    pub nationality: String,
}
