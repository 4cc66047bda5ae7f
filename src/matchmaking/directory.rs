//! Room directory - matchmaking, routing and room reaping

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::room::JoinRejected;
use crate::game::{GameRoom, PlayerAction, PlayerId, RoomHandle, RoomId, RoomSettings};
use crate::ws::protocol::{JoinMode, RoomSnapshot, ServerMsg};

/// Failures surfaced to clients by directory operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("The room does not exist")]
    RoomNotFound,

    #[error("Could not join room: {0}")]
    Join(#[from] JoinRejected),
}

/// Owns every live room by id and knows which room each player sits in
pub struct RoomDirectory {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    player_rooms: Arc<DashMap<PlayerId, RoomId>>,
    settings: RoomSettings,
}

impl RoomDirectory {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            player_rooms: Arc::new(DashMap::new()),
            settings,
        }
    }

    /// Seat a player. Solo always gets a fresh, already started room; multi
    /// fills the first lobby with a free seat or opens a new one.
    pub async fn join_room(
        &self,
        player_id: PlayerId,
        mode: JoinMode,
    ) -> Result<RoomSnapshot, DirectoryError> {
        if let Some(previous) = self.room_of(&player_id) {
            debug!(player_id = %player_id, room_id = %previous, "Player rejoining, leaving previous room");
            self.disconnect(player_id).await;
        }

        if mode == JoinMode::Multi {
            for handle in self.lobby_candidates() {
                match handle.join(player_id, false).await {
                    Ok(snapshot) => {
                        self.player_rooms.insert(player_id, handle.id);
                        info!(player_id = %player_id, room_id = %handle.id, "Player matched into lobby");
                        return Ok(snapshot);
                    }
                    Err(rejected) => {
                        debug!(room_id = %handle.id, reason = %rejected, "Lobby candidate rejected join");
                    }
                }
            }
        }

        let handle = self.create_room(mode);
        let snapshot = handle.join(player_id, mode == JoinMode::Solo).await?;
        self.player_rooms.insert(player_id, handle.id);

        info!(player_id = %player_id, room_id = %handle.id, mode = ?handle.mode(), "Player joined new room");
        Ok(snapshot)
    }

    /// Remove a player from a specific room; the room tells its remaining members
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
    ) -> Result<(), DirectoryError> {
        let handle = self.get(&room_id).ok_or(DirectoryError::RoomNotFound)?;

        self.player_rooms
            .remove_if(&player_id, |_, seated_in| *seated_in == room_id);

        match handle.leave(player_id).await {
            Some(0) => self.reap(&room_id),
            Some(_) => {}
            None => {
                self.reap(&room_id);
                return Err(DirectoryError::RoomNotFound);
            }
        }

        Ok(())
    }

    /// Connection dropped: take the player out of whatever room they were in
    pub async fn disconnect(&self, player_id: PlayerId) {
        let Some((_, room_id)) = self.player_rooms.remove(&player_id) else {
            return;
        };
        let Some(handle) = self.get(&room_id) else {
            return;
        };

        match handle.leave(player_id).await {
            Some(0) | None => self.reap(&room_id),
            Some(_) => {}
        }

        info!(player_id = %player_id, room_id = %room_id, "Player disconnected");
    }

    /// Fire-and-forget start of a lobby room
    pub async fn start_game(&self, room_id: RoomId) {
        match self.get(&room_id) {
            Some(handle) => handle.start().await,
            None => debug!(room_id = %room_id, "Start for unknown room ignored"),
        }
    }

    /// Queue an action on the room the player sits in; unknown players are ignored
    pub async fn route_action(&self, player_id: PlayerId, action: PlayerAction) {
        let Some(handle) = self.room_of(&player_id).and_then(|room_id| self.get(&room_id)) else {
            debug!(player_id = %player_id, ?action, "Action from player without a room ignored");
            return;
        };

        handle.act(player_id, action).await;
    }

    /// Receive a room's broadcasts
    pub fn subscribe(&self, room_id: &RoomId) -> Option<broadcast::Receiver<ServerMsg>> {
        self.get(room_id).map(|handle| handle.subscribe())
    }

    /// Multi lobbies that still have a free seat
    pub fn available_rooms(&self) -> Vec<RoomId> {
        self.lobby_candidates().into_iter().map(|h| h.id).collect()
    }

    pub fn room_of(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.player_rooms.get(player_id).map(|r| *r)
    }

    pub fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    fn lobby_candidates(&self) -> Vec<RoomHandle> {
        self.rooms
            .iter()
            .filter(|r| r.value().is_joinable(self.settings.capacity))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Spawn a new room task; the room removes itself from the directory when
    /// its task ends. Solo rooms are published unseated but never matched.
    fn create_room(&self, mode: JoinMode) -> RoomHandle {
        let room_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let (room, handle) = GameRoom::new(room_id, seed, self.settings, mode);

        self.rooms.insert(room_id, handle.clone());
        info!(room_id = %room_id, "Created new room");

        let rooms = self.rooms.clone();
        let player_rooms = self.player_rooms.clone();

        tokio::spawn(async move {
            room.run().await;

            rooms.remove(&room_id);
            player_rooms.retain(|_, seated_in| *seated_in != room_id);

            info!(room_id = %room_id, "Room removed from directory");
        });

        handle
    }

    fn reap(&self, room_id: &RoomId) {
        if self.rooms.remove(room_id).is_some() {
            self.player_rooms.retain(|_, seated_in| *seated_in != *room_id);
            info!(room_id = %room_id, "Reaped empty room");
        } else {
            debug!(room_id = %room_id, "Room already removed");
        }
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new(RoomSettings::default())
    }
}
