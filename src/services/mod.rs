pub mod extract;
pub mod http;
pub mod reconcile;
pub mod standings;
pub mod store;
pub mod telemetry;

use thiserror::Error;

use crate::models::session::SessionKind;

pub use standings::StandingsProvider;
pub use store::SyncStore;
pub use telemetry::SessionProvider;

/// Failures talking to an upstream data source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no {kind} session for {event} {season}")]
    SessionNotFound {
        season: i32,
        event: String,
        kind: SessionKind,
    },
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}
