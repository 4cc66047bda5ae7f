//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::RoomDirectory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<RoomDirectory>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(RoomDirectory::new(config.room_settings()));

        Self {
            config: Arc::new(config),
            directory,
        }
    }
}
