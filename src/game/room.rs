//! Room state and authoritative tick loop

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::DEFAULT_TICK_RATE_HZ;
use crate::ws::protocol::{JoinMode, RoomSnapshot, ServerMsg};

use super::board::DEFAULT_GRAVITY_INTERVAL;
use super::session::PlayerSession;
use super::snapshot;
use super::{PendingAction, PlayerAction, PlayerId, RoomId};

/// Players allowed in one room
pub const ROOM_CAPACITY: usize = 2;

/// Room lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Accepting players, not ticking
    Lobby,
    /// Tick loop running
    Playing,
    /// Stopped for good
    Finished,
}

/// Tunables shared by every room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    pub tick_rate_hz: u32,
    pub gravity_interval: Duration,
    pub capacity: usize,
}

impl RoomSettings {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            gravity_interval: DEFAULT_GRAVITY_INTERVAL,
            capacity: ROOM_CAPACITY,
        }
    }
}

/// Why a room turned a player away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejected {
    #[error("Room is full")]
    Full,

    #[error("Room is no longer in the lobby")]
    NotInLobby,

    #[error("Room has shut down")]
    Closed,
}

/// Everything that can reach a room from outside. The room task is the only consumer.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        /// Start right after seating the player (solo rooms)
        start: bool,
        reply: oneshot::Sender<Result<RoomSnapshot, JoinRejected>>,
    },
    Leave {
        player_id: PlayerId,
        /// Players left in the room
        reply: oneshot::Sender<usize>,
    },
    Start,
    Act {
        player_id: PlayerId,
        action: PlayerAction,
    },
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Winner(PlayerId),
    /// Not playing (anymore); the loop should stop
    Stopped,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    mode: JoinMode,
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    status: Arc<RwLock<RoomStatus>>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> RoomStatus {
        *self.status.read()
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    /// Multi lobbies with a free seat. Solo rooms are never offered to others.
    pub fn is_joinable(&self, capacity: usize) -> bool {
        self.mode == JoinMode::Multi
            && self.status() == RoomStatus::Lobby
            && self.player_count() < capacity
    }

    /// Receive every broadcast the room sends from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        start: bool,
    ) -> Result<RoomSnapshot, JoinRejected> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                player_id,
                start,
                reply,
            })
            .await
            .map_err(|_| JoinRejected::Closed)?;

        response.await.map_err(|_| JoinRejected::Closed)?
    }

    /// Remove a player; `None` if the room task is already gone
    pub async fn leave(&self, player_id: PlayerId) -> Option<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Leave { player_id, reply })
            .await
            .ok()?;

        response.await.ok()
    }

    pub async fn start(&self) {
        if self.commands.send(RoomCommand::Start).await.is_err() {
            debug!(room_id = %self.id, "Start for closed room ignored");
        }
    }

    pub async fn act(&self, player_id: PlayerId, action: PlayerAction) {
        if self
            .commands
            .send(RoomCommand::Act { player_id, action })
            .await
            .is_err()
        {
            debug!(room_id = %self.id, player_id = %player_id, "Action for closed room ignored");
        }
    }
}

/// A player's session plus the input waiting for the next tick
#[derive(Debug)]
struct Seat {
    session: PlayerSession,
    pending: PendingAction,
}

/// The authoritative room, owned by its task
pub struct GameRoom {
    id: RoomId,
    status: RoomStatus,
    seats: BTreeMap<PlayerId, Seat>,
    settings: RoomSettings,
    /// Seats on offer; 1 for solo rooms
    capacity: usize,
    rng: ChaCha8Rng,
    ticks: u64,
    commands: mpsc::Receiver<RoomCommand>,
    events: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    shared_status: Arc<RwLock<RoomStatus>>,
}

impl GameRoom {
    /// Create a new room in the lobby
    pub fn new(
        id: RoomId,
        seed: u64,
        settings: RoomSettings,
        mode: JoinMode,
    ) -> (Self, RoomHandle) {
        let (commands_tx, commands) = mpsc::channel(256);
        let (events, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let shared_status = Arc::new(RwLock::new(RoomStatus::Lobby));

        let handle = RoomHandle {
            id,
            mode,
            commands: commands_tx,
            events: events.clone(),
            player_count: player_count.clone(),
            status: shared_status.clone(),
        };

        let room = Self {
            id,
            status: RoomStatus::Lobby,
            seats: BTreeMap::new(),
            settings,
            capacity: match mode {
                JoinMode::Solo => 1,
                JoinMode::Multi => settings.capacity,
            },
            rng: ChaCha8Rng::seed_from_u64(seed),
            ticks: 0,
            commands,
            events,
            player_count,
            shared_status,
        };

        (room, handle)
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Serve lobby commands until started, then run the tick loop until the
    /// room finishes
    pub async fn run(mut self) {
        info!(room_id = %self.id, "Room opened");

        while self.status == RoomStatus::Lobby {
            match self.commands.recv().await {
                Some(command) => self.handle_command(command),
                None => self.set_status(RoomStatus::Finished),
            }
        }

        if self.status == RoomStatus::Playing {
            self.play().await;
        }

        info!(room_id = %self.id, ticks = self.ticks, "Room closed");
    }

    async fn play(&mut self) {
        let mut ticker = interval(self.settings.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            ticker.tick().await;

            self.drain_commands();

            let now = Instant::now();
            let dt = now - last_tick;
            last_tick = now;

            let outcome = self.tick(dt);
            if outcome != TickOutcome::Continue {
                debug!(room_id = %self.id, ?outcome, "Tick loop stopped");
                break;
            }
        }
    }

    /// Apply every command queued since the last call
    pub fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }
    }

    pub fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                player_id,
                start,
                reply,
            } => {
                let result = self.add_player(player_id).map(|()| {
                    if start {
                        self.start();
                    }
                    self.snapshot()
                });
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                self.remove_player(player_id);
                let _ = reply.send(self.seats.len());
            }
            RoomCommand::Start => self.start(),
            RoomCommand::Act { player_id, action } => match self.seats.get_mut(&player_id) {
                Some(seat) => seat.pending.record(action),
                None => {
                    debug!(room_id = %self.id, player_id = %player_id, "Action for unknown player ignored")
                }
            },
        }
    }

    fn add_player(&mut self, player_id: PlayerId) -> Result<(), JoinRejected> {
        if self.status != RoomStatus::Lobby {
            return Err(JoinRejected::NotInLobby);
        }
        if self.seats.contains_key(&player_id) {
            return Ok(());
        }
        if self.seats.len() >= self.capacity {
            return Err(JoinRejected::Full);
        }

        let session = PlayerSession::new(player_id, self.rng.gen(), self.settings.gravity_interval);
        self.seats.insert(
            player_id,
            Seat {
                session,
                pending: PendingAction::default(),
            },
        );
        self.player_count.store(self.seats.len(), Ordering::Relaxed);

        info!(
            room_id = %self.id,
            player_id = %player_id,
            player_count = self.seats.len(),
            "Player joined room"
        );

        self.broadcast_state();
        Ok(())
    }

    fn remove_player(&mut self, player_id: PlayerId) {
        if self.seats.remove(&player_id).is_none() {
            return;
        }
        self.player_count.store(self.seats.len(), Ordering::Relaxed);

        let _ = self.events.send(ServerMsg::LeaveRoom { player_id });

        info!(
            room_id = %self.id,
            player_id = %player_id,
            player_count = self.seats.len(),
            "Player left room"
        );

        if self.seats.is_empty() && self.status != RoomStatus::Finished {
            info!(room_id = %self.id, "Room emptied");
            self.set_status(RoomStatus::Finished);
        }
    }

    /// Lobby -> Playing; anything else is ignored
    pub fn start(&mut self) {
        if self.status != RoomStatus::Lobby {
            debug!(room_id = %self.id, status = ?self.status, "Start ignored");
            return;
        }
        self.set_status(RoomStatus::Playing);
        info!(room_id = %self.id, player_count = self.seats.len(), "Game started");
    }

    /// Run one simulation step over every player, in player-id order
    pub fn tick(&mut self, dt: Duration) -> TickOutcome {
        if self.status != RoomStatus::Playing {
            return TickOutcome::Stopped;
        }
        if self.seats.is_empty() {
            self.set_status(RoomStatus::Finished);
            return TickOutcome::Stopped;
        }

        self.ticks += 1;

        let ids: Vec<PlayerId> = self.seats.keys().copied().collect();
        let mut anyone_topped_out = false;

        for id in &ids {
            let seat = self
                .seats
                .get_mut(id)
                .expect("seat ids were collected from the map");
            let was_over = seat.session.is_game_over();
            let action = std::mem::take(&mut seat.pending);
            seat.session.update(dt, &action);

            if !was_over && seat.session.is_game_over() {
                anyone_topped_out = true;
                info!(room_id = %self.id, player_id = %id, "Player topped out");
            }
        }

        // Judged once every player has moved, so a same-tick top out cannot win
        if anyone_topped_out && self.seats.len() > 1 {
            let survivors: Vec<PlayerId> = self
                .seats
                .iter()
                .filter(|(_, seat)| !seat.session.is_game_over())
                .map(|(id, _)| *id)
                .collect();

            match survivors[..] {
                [player_id] => {
                    info!(room_id = %self.id, player_id = %player_id, "Winner decided");
                    let _ = self.events.send(ServerMsg::GameWinner {
                        room_id: self.id,
                        player_id,
                    });
                    self.set_status(RoomStatus::Finished);
                    return TickOutcome::Winner(player_id);
                }
                [] => {
                    info!(room_id = %self.id, "Every player topped out, no winner");
                    self.set_status(RoomStatus::Finished);
                    self.broadcast_state();
                    return TickOutcome::Stopped;
                }
                _ => {}
            }
        }

        self.broadcast_state();
        TickOutcome::Continue
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        snapshot::room_snapshot(
            self.id,
            self.status,
            self.seats.values().map(|seat| &seat.session),
        )
    }

    fn broadcast_state(&self) {
        // No receivers is fine; nobody is listening yet
        let _ = self.events.send(snapshot::state_update(
            self.id,
            self.status,
            self.seats.values().map(|seat| &seat.session),
        ));
    }

    fn set_status(&mut self, status: RoomStatus) {
        self.status = status;
        *self.shared_status.write() = status;
    }
}
