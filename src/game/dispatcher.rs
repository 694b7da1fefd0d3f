//! Dispatcher module
//!
//! Routes client commands into the world and drives state broadcasts:
//! - Player registry keyed by session (login, logout)
//! - Movement state machine with one cancellable task per moving player
//! - Door relocation between areas
//! - Fixed-delay tick broadcasting per-area state deltas
//!
//! Lock order: a player's control lock first, then area locks in ascending
//! area id. The tick only ever holds one area lock. Nothing is held across
//! an await, and outbound events are queued without blocking.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::auth::CredentialStore;
use crate::config::ServerConfig;
use crate::game::area::{AreaGuard, AreaId, MoveOutcome};
use crate::game::door::Door;
use crate::game::player::{Direction, MovementState, Player, PlayerId};
use crate::game::world::World;
use crate::net::session::{SessionId, SessionManager};
use crate::protocol::{Command, LoginFailure, OutboundEvent, PlayerInfo, PositionChange};

/// Timing and movement parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Pause between the end of one tick and the start of the next
    pub tick_delay: Duration,
    /// Minimum time between movement steps and starts
    pub walk_delay: Duration,
    /// Pixels per step
    pub player_speed: i32,
    /// Side of the square player footprint
    pub entity_size: i32,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            tick_delay: Duration::from_millis(200),
            walk_delay: Duration::from_millis(100),
            player_speed: 8,
            entity_size: 32,
        }
    }
}

impl From<&ServerConfig> for DispatcherSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            tick_delay: config.tick_delay(),
            walk_delay: config.walk_delay(),
            player_speed: config.player_speed as i32,
            entity_size: config.entity_size as i32,
        }
    }
}

/// Movement bookkeeping for one player, guarded by the entry's control lock
#[derive(Debug, Default)]
struct PlayerControl {
    area_id: AreaId,
    movement: MovementState,
    last_movement: Option<Instant>,
    /// Bumped whenever movement is started or cancelled; a step only runs
    /// if it still carries the current generation
    generation: u64,
    task: Option<JoinHandle<()>>,
    removed: bool,
}

impl PlayerControl {
    /// Leave the moving state and invalidate any in-flight step
    fn halt(&mut self) {
        self.movement = MovementState::Idle;
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Registry entry of a logged-in player
pub struct PlayerEntry {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub username: String,
    control: Mutex<PlayerControl>,
}

impl PlayerEntry {
    /// Area currently holding the player
    pub fn area_id(&self) -> AreaId {
        self.control.lock().area_id
    }

    pub fn movement(&self) -> MovementState {
        self.control.lock().movement
    }
}

impl std::fmt::Debug for PlayerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.control.lock();
        f.debug_struct("PlayerEntry")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("username", &self.username)
            .field("area_id", &control.area_id)
            .field("movement", &control.movement)
            .finish()
    }
}

/// Command router and state broadcaster
pub struct Dispatcher {
    settings: DispatcherSettings,
    world: Arc<World>,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<SessionManager>,
    /// Logged-in players by session
    players: DashMap<SessionId, Arc<PlayerEntry>>,
    /// Normalized username -> session, to refuse a second login
    usernames: DashMap<String, SessionId>,
    next_player_id: AtomicU32,
    tick: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        settings: DispatcherSettings,
        world: Arc<World>,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            settings,
            world,
            credentials,
            sessions,
            players: DashMap::new(),
            usernames: DashMap::new(),
            next_player_id: AtomicU32::new(1),
            tick: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Number of logged-in players
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Number of ticks processed so far
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Registry entry of the player bound to a session
    pub fn player(&self, session_id: SessionId) -> Option<Arc<PlayerEntry>> {
        self.players.get(&session_id).map(|e| e.clone())
    }

    /// Route a decoded client command
    pub fn handle(self: &Arc<Self>, session_id: SessionId, command: Command) {
        trace!(session_id, command = command.name(), "Handling command");

        match command {
            Command::Login { username, password } => {
                match self.login(session_id, &username, &password) {
                    Ok(player_id) => trace!(session_id, player_id, "Login command accepted"),
                    Err(reason) => trace!(session_id, reason = ?reason, "Login command rejected"),
                }
            }
            Command::MoveStart { direction } => {
                self.move_start(session_id, direction);
            }
            Command::MoveStop => {
                self.move_stop(session_id);
            }
            Command::Disconnect => {
                self.disconnect(session_id);
            }
        }
    }

    /// Authenticate a session and place its player in the world.
    ///
    /// The outcome is also reported to the session as `LoginAccepted` or
    /// `LoginRejected`.
    pub fn login(
        &self,
        session_id: SessionId,
        username: &str,
        password: &str,
    ) -> Result<PlayerId, LoginFailure> {
        let result = self.try_login(session_id, username, password);
        if let Err(reason) = result {
            debug!(session_id, username = %username, reason = ?reason, "Login rejected");
            self.sessions
                .send(session_id, OutboundEvent::LoginRejected { reason });
        }
        result
    }

    fn try_login(
        &self,
        session_id: SessionId,
        username: &str,
        password: &str,
    ) -> Result<PlayerId, LoginFailure> {
        if self.players.contains_key(&session_id) {
            return Err(LoginFailure::AlreadyLoggedIn);
        }

        let account = self
            .credentials
            .authenticate(username, password)
            .map_err(|e| LoginFailure::from(&e))?;

        match self.usernames.entry(account.username.clone()) {
            Entry::Occupied(_) => return Err(LoginFailure::AlreadyLoggedIn),
            Entry::Vacant(slot) => {
                slot.insert(session_id);
            }
        }

        let spawn = account.spawn;
        let Some(area) = self.world.area(spawn.area_id) else {
            error!(
                username = %account.username,
                area_id = spawn.area_id,
                "Home area does not exist"
            );
            self.usernames.remove(&account.username);
            return Err(LoginFailure::ServerError);
        };

        let id = self.next_player_id.fetch_add(1, Ordering::SeqCst);
        let player = Player::new(
            id,
            session_id,
            account.username.clone(),
            account.sprite,
            spawn.area_id,
            spawn.x,
            spawn.y,
            self.settings.entity_size,
            self.settings.player_speed,
        )
        .with_direction(account.direction);
        let info = PlayerInfo::from(&player);

        let entry = Arc::new(PlayerEntry {
            id,
            session_id,
            username: account.username.clone(),
            control: Mutex::new(PlayerControl {
                area_id: spawn.area_id,
                ..PlayerControl::default()
            }),
        });

        {
            let _control = entry.control.lock();
            let mut guard = area.lock();
            guard.admit(player);

            self.sessions
                .send(session_id, OutboundEvent::LoginAccepted { player_id: id });
            self.sessions.send(session_id, guard.snapshot().into());
            self.sessions.broadcast(
                &guard.occupant_sessions(Some(id)),
                &OutboundEvent::EntityAppeared { player: info },
            );
        }

        self.players.insert(session_id, entry);

        info!(
            session_id,
            player_id = id,
            username = %account.username,
            area_id = spawn.area_id,
            "Player logged in"
        );

        Ok(id)
    }

    /// Start moving a player. Returns whether movement started.
    pub fn move_start(self: &Arc<Self>, session_id: SessionId, direction: Direction) -> bool {
        let Some(entry) = self.player(session_id) else {
            debug!(session_id, "Move start from session without a player");
            return false;
        };

        let mut control = entry.control.lock();
        if control.removed {
            return false;
        }
        if control.movement == MovementState::Moving {
            debug!(player_id = entry.id, "Move start ignored, already moving");
            return false;
        }

        let now = Instant::now();
        if let Some(last) = control.last_movement {
            if now.duration_since(last) < self.settings.walk_delay {
                debug!(player_id = entry.id, "Move start ignored, walk delay");
                return false;
            }
        }

        let Some(area) = self.world.area(control.area_id) else {
            error!(
                player_id = entry.id,
                area_id = control.area_id,
                "Player is in a missing area"
            );
            return false;
        };
        let mut guard = area.lock();

        match guard.check_move(entry.id, direction) {
            Ok(true) => {}
            Ok(false) => {
                // Let clients settle the entity where it is
                trace!(player_id = entry.id, direction = %direction, "Move start blocked");
                self.broadcast_stopped(&guard, entry.id);
                return false;
            }
            Err(e) => {
                error!(player_id = entry.id, error = %e, "Move start failed");
                return false;
            }
        }

        if let Err(e) = guard.set_direction(entry.id, direction) {
            error!(player_id = entry.id, error = %e, "Move start failed");
            return false;
        }

        control.movement = MovementState::Moving;
        control.last_movement = Some(now);
        control.generation += 1;
        let generation = control.generation;

        self.sessions.broadcast(
            &guard.occupant_sessions(None),
            &OutboundEvent::MoveStarted {
                player_id: entry.id,
                direction,
            },
        );
        drop(guard);

        control.task = Some(self.spawn_movement(entry.clone(), generation));
        debug!(player_id = entry.id, direction = %direction, "Movement started");
        true
    }

    fn spawn_movement(self: &Arc<Self>, entry: Arc<PlayerEntry>, generation: u64) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        let walk_delay = self.settings.walk_delay;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(walk_delay).await;
                if !dispatcher.step(&entry, generation) {
                    break;
                }
            }
        })
    }

    /// Advance a moving player by one step. Returns whether another step
    /// should follow.
    fn step(&self, entry: &PlayerEntry, generation: u64) -> bool {
        let mut control = entry.control.lock();
        if control.removed
            || control.movement != MovementState::Moving
            || control.generation != generation
        {
            return false;
        }

        let Some(area) = self.world.area(control.area_id) else {
            error!(
                player_id = entry.id,
                area_id = control.area_id,
                "Player is in a missing area"
            );
            control.movement = MovementState::Idle;
            control.task = None;
            return false;
        };
        let mut guard = area.lock();
        control.last_movement = Some(Instant::now());

        match guard.apply_move(entry.id) {
            Ok(MoveOutcome::Moved) => {
                trace!(player_id = entry.id, area_id = guard.id(), "Player stepped");
                true
            }
            Ok(MoveOutcome::Collided) => {
                trace!(player_id = entry.id, area_id = guard.id(), "Player collided");
                control.movement = MovementState::Idle;
                control.task = None;
                self.broadcast_stopped(&guard, entry.id);
                false
            }
            Ok(MoveOutcome::ReachedDoor(door)) => {
                drop(guard);
                control.movement = MovementState::Idle;
                control.task = None;

                if !self.relocate(entry, &mut control, &door) {
                    // Settle the player where the door left it
                    let guard = area.lock();
                    self.broadcast_stopped(&guard, entry.id);
                }
                false
            }
            Err(e) => {
                error!(player_id = entry.id, error = %e, "Movement step failed");
                control.movement = MovementState::Idle;
                control.task = None;
                false
            }
        }
    }

    /// Move a player through a door. Returns false if the door could not be
    /// used, in which case the player stays where it is.
    fn relocate(&self, entry: &PlayerEntry, control: &mut PlayerControl, door: &Door) -> bool {
        if door.is_local() {
            let Some(area) = self.world.area(door.source_area) else {
                return false;
            };
            let mut guard = area.lock();
            let Some(mut player) = guard.dismiss(entry.id) else {
                error!(player_id = entry.id, door_id = door.id, "Player vanished before relocation");
                return false;
            };
            player.place_at(door.destination_area, door.destination_x, door.destination_y);
            guard.admit(player);
            self.sessions.send(entry.session_id, guard.snapshot().into());

            debug!(
                player_id = entry.id,
                door_id = door.id,
                area_id = door.destination_area,
                "Player relocated within area"
            );
            return true;
        }

        let (mut source, mut destination) =
            match self.world.lock_pair(door.source_area, door.destination_area) {
                Ok(guards) => guards,
                Err(e) => {
                    error!(
                        door_id = door.id,
                        source_area = door.source_area,
                        destination_area = door.destination_area,
                        error = %e,
                        "Door leads nowhere, treating as a wall"
                    );
                    return false;
                }
            };

        let Some(mut player) = source.dismiss(entry.id) else {
            error!(player_id = entry.id, door_id = door.id, "Player vanished before relocation");
            return false;
        };
        player.place_at(door.destination_area, door.destination_x, door.destination_y);
        let info = PlayerInfo::from(&player);
        destination.admit(player);
        control.area_id = door.destination_area;

        self.sessions.broadcast(
            &source.occupant_sessions(None),
            &OutboundEvent::EntityDisappeared {
                player_id: entry.id,
            },
        );
        self.sessions
            .send(entry.session_id, destination.snapshot().into());
        self.sessions.broadcast(
            &destination.occupant_sessions(Some(entry.id)),
            &OutboundEvent::EntityAppeared { player: info },
        );

        debug!(
            player_id = entry.id,
            door_id = door.id,
            from_area = door.source_area,
            to_area = door.destination_area,
            "Player relocated"
        );
        true
    }

    /// Stop a moving player. Returns whether the player was moving.
    pub fn move_stop(&self, session_id: SessionId) -> bool {
        let Some(entry) = self.player(session_id) else {
            debug!(session_id, "Move stop from session without a player");
            return false;
        };

        let mut control = entry.control.lock();
        if control.removed || control.movement != MovementState::Moving {
            debug!(player_id = entry.id, "Move stop ignored, not moving");
            return false;
        }
        control.halt();

        if let Some(area) = self.world.area(control.area_id) {
            let guard = area.lock();
            self.broadcast_stopped(&guard, entry.id);
        }

        debug!(player_id = entry.id, "Movement stopped");
        true
    }

    /// Remove a session's player from the world. A no-op if the session has
    /// no player.
    pub fn disconnect(&self, session_id: SessionId) -> bool {
        let Some((_, entry)) = self.players.remove(&session_id) else {
            trace!(session_id, "Disconnect for session without a player");
            return false;
        };
        self.usernames
            .remove_if(&entry.username, |_, owner| *owner == session_id);

        let mut control = entry.control.lock();
        control.halt();
        control.removed = true;

        if let Some(area) = self.world.area(control.area_id) {
            let mut guard = area.lock();
            if guard.dismiss(entry.id).is_some() {
                self.sessions.broadcast(
                    &guard.occupant_sessions(None),
                    &OutboundEvent::EntityDisappeared {
                        player_id: entry.id,
                    },
                );
            } else {
                warn!(
                    player_id = entry.id,
                    area_id = control.area_id,
                    "Disconnected player was not in its area"
                );
            }
        }

        info!(
            session_id,
            player_id = entry.id,
            username = %entry.username,
            "Player logged out"
        );
        true
    }

    /// Disconnect every logged-in player
    pub fn disconnect_all(&self) {
        let sessions: Vec<SessionId> = self.players.iter().map(|e| *e.key()).collect();
        for session_id in sessions {
            self.disconnect(session_id);
        }
    }

    /// Broadcast the changes of every area since the previous tick.
    ///
    /// Returns the number of `StateDelta` events emitted (one per area with
    /// changes).
    pub fn process_tick(&self) -> usize {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let mut deltas = 0;

        for area in self.world.areas() {
            let mut guard = area.lock();
            let dirty = guard.drain_dirty();
            if dirty.is_empty() {
                continue;
            }

            // Players that left since being marked are skipped
            let mut changes: Vec<PositionChange> = dirty
                .iter()
                .filter_map(|&id| guard.player(id))
                .map(PositionChange::from)
                .collect();
            if changes.is_empty() {
                continue;
            }
            changes.sort_by_key(|c| c.player_id);

            self.sessions.broadcast(
                &guard.occupant_sessions(None),
                &OutboundEvent::StateDelta { changes },
            );
            deltas += 1;
        }

        trace!(tick, deltas, "Tick processed");
        deltas
    }

    /// Run the tick loop until shutdown is signalled
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            tick_delay_ms = self.settings.tick_delay.as_millis() as u64,
            walk_delay_ms = self.settings.walk_delay.as_millis() as u64,
            "Tick loop started"
        );

        loop {
            self.process_tick();

            tokio::select! {
                _ = tokio::time::sleep(self.settings.tick_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!(ticks = self.tick(), "Tick loop shutting down");
                    break;
                }
            }
        }
    }

    fn broadcast_stopped(&self, guard: &AreaGuard<'_>, player_id: PlayerId) {
        if let Some(player) = guard.player(player_id) {
            self.sessions.broadcast(
                &guard.occupant_sessions(None),
                &OutboundEvent::move_stopped(player),
            );
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("players", &self.players.len())
            .field("tick", &self.tick())
            .finish()
    }
}
