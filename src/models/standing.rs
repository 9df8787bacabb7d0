use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStanding {
    pub season: i32,
    pub round: i32,
    pub driver_id: String,
    pub position: i32,
    pub points: f64,
    pub wins: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorStanding {
    pub season: i32,
    pub round: i32,
    pub constructor_id: String,
    pub position: i32,
    pub points: f64,
    pub wins: i32,
}
