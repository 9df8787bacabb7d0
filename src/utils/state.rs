use std::sync::Arc;

use crate::{
    models::reference::ReferenceData,
    services::{SessionProvider, StandingsProvider, SyncStore},
};

pub struct AppState {
    pub reference: Arc<ReferenceData>,
    pub sessions: Arc<dyn SessionProvider>,
    pub standings: Arc<dyn StandingsProvider>,
    pub store: Arc<dyn SyncStore>,
}
