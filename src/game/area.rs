//! Area module
//!
//! An area is a rectangular partition of the world map and the unit of
//! concurrency and broadcast scope. Each area owns:
//! - Static collision planes (tile bounding boxes plus boundary planes)
//! - The doors whose triggers lie inside it
//! - The players currently inside it
//! - A dirty-player tracker drained by the dispatcher tick
//!
//! All mutable state sits behind a single mutex. Operations that read or
//! change it are only reachable through an [`AreaGuard`], so holding the lock
//! is enforced by the type system and released on every exit path.

use std::collections::{BTreeMap, HashSet};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::GameError;
use crate::game::door::Door;
use crate::game::geometry::Rectangle;
use crate::game::player::{Direction, Player, PlayerId};
use crate::net::session::SessionId;

/// Area identifier
pub type AreaId = u32;

/// Tile id that marks an empty cell
pub const EMPTY_TILE: u32 = 0;

/// One tile layer, sliced to an area's bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub width: u32,
    pub height: u32,
    /// Row-major tile ids
    pub tiles: Vec<u32>,
}

impl Layer {
    pub fn new(width: u32, height: u32, tiles: Vec<u32>) -> Self {
        Self {
            width,
            height,
            tiles,
        }
    }
}

/// Result of applying one movement step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The step was committed
    Moved,
    /// The step was rejected and the position is unchanged
    Collided,
    /// The step was committed and the new footprint touches a door
    ReachedDoor(Door),
}

/// Read-only export of an area for a newly admitted player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaSnapshot {
    pub width: u32,
    pub height: u32,
    pub tile_layers: Vec<Vec<u32>>,
    pub players: Vec<Player>,
}

#[derive(Debug, Default)]
struct AreaState {
    players: BTreeMap<PlayerId, Player>,
    dirty: HashSet<PlayerId>,
}

/// A spatial partition of the world
pub struct Area {
    pub id: AreaId,
    /// Width in tiles
    width: u32,
    /// Height in tiles
    height: u32,
    /// Tile edge length in pixels
    tile_size: u32,
    layers: Vec<Layer>,
    static_planes: Vec<Rectangle>,
    doors: Vec<Door>,
    state: Mutex<AreaState>,
}

impl Area {
    /// Create an area.
    ///
    /// `obstacles` are collision rectangles in area-local pixels; the four
    /// boundary planes are added here.
    pub fn new(
        id: AreaId,
        width: u32,
        height: u32,
        tile_size: u32,
        layers: Vec<Layer>,
        obstacles: Vec<Rectangle>,
        doors: Vec<Door>,
    ) -> Self {
        let mut static_planes = obstacles;
        static_planes.extend(boundary_planes(width, height, tile_size));

        Self {
            id,
            width,
            height,
            tile_size,
            layers,
            static_planes,
            doors,
            state: Mutex::new(AreaState::default()),
        }
    }

    /// Acquire the area lock
    pub fn lock(&self) -> AreaGuard<'_> {
        AreaGuard {
            area: self,
            state: self.state.lock(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Area extent in area-local pixels
    pub fn pixel_bounds(&self) -> Rectangle {
        Rectangle::new(
            0,
            0,
            to_pixels(self.width, self.tile_size),
            to_pixels(self.height, self.tile_size),
        )
    }

    pub fn static_planes(&self) -> &[Rectangle] {
        &self.static_planes
    }

    pub fn doors(&self) -> &[Door] {
        &self.doors
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl std::fmt::Debug for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Area")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("tile_size", &self.tile_size)
            .field("static_planes", &self.static_planes.len())
            .field("doors", &self.doors.len())
            .finish()
    }
}

/// Planes one tile outside each edge, so leaving the map is an ordinary collision
fn boundary_planes(width: u32, height: u32, tile_size: u32) -> [Rectangle; 4] {
    let ts = to_pixels(1, tile_size);
    let w = to_pixels(width, tile_size);
    let h = to_pixels(height, tile_size);

    [
        // top
        Rectangle::new(-ts, -ts, w.saturating_add(ts), 0),
        // bottom
        Rectangle::new(-ts, h, w.saturating_add(ts), h.saturating_add(ts)),
        // left
        Rectangle::new(-ts, -ts, 0, h.saturating_add(ts)),
        // right
        Rectangle::new(w, -ts, w.saturating_add(ts), h.saturating_add(ts)),
    ]
}

/// Tile count to pixels, clamped to `i32::MAX`
fn to_pixels(tiles: u32, tile_size: u32) -> i32 {
    i32::try_from(u64::from(tiles) * u64::from(tile_size)).unwrap_or(i32::MAX)
}

/// Exclusive access to an area's mutable state
pub struct AreaGuard<'a> {
    area: &'a Area,
    state: MutexGuard<'a, AreaState>,
}

impl<'a> AreaGuard<'a> {
    pub fn id(&self) -> AreaId {
        self.area.id
    }

    pub fn area(&self) -> &'a Area {
        self.area
    }

    /// Add a player to this area and mark it dirty
    pub fn admit(&mut self, mut player: Player) {
        player.area_id = self.area.id;
        let id = player.id;
        self.state.players.insert(id, player);
        self.state.dirty.insert(id);
        trace!(area_id = self.area.id, player_id = id, "Player admitted");
    }

    /// Remove a player from this area
    pub fn dismiss(&mut self, player_id: PlayerId) -> Option<Player> {
        let player = self.state.players.remove(&player_id);
        if player.is_some() {
            trace!(area_id = self.area.id, player_id, "Player dismissed");
        }
        player
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.state.players.contains_key(&player_id)
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.state.players.get(&player_id)
    }

    /// Players in ascending id order
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.state.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.state.players.len()
    }

    /// Sessions of every occupant, optionally leaving one player out
    pub fn occupant_sessions(&self, except: Option<PlayerId>) -> Vec<SessionId> {
        self.state
            .players
            .values()
            .filter(|p| Some(p.id) != except)
            .map(|p| p.session_id)
            .collect()
    }

    /// Change a player's facing direction
    pub fn set_direction(
        &mut self,
        player_id: PlayerId,
        direction: Direction,
    ) -> Result<(), GameError> {
        let area = self.area.id;
        let player = self
            .state
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotInArea {
                player: player_id,
                area,
            })?;
        player.direction = direction;
        Ok(())
    }

    /// Check whether a step in `direction` would be accepted, without moving
    pub fn check_move(&self, player_id: PlayerId, direction: Direction) -> Result<bool, GameError> {
        let player = self.require(player_id)?;
        let candidate = player.step_target(direction);
        Ok(!self.is_blocked(&player.position(), &candidate, player_id))
    }

    /// Move a player one step in its current direction
    pub fn apply_move(&mut self, player_id: PlayerId) -> Result<MoveOutcome, GameError> {
        let player = self.require(player_id)?;
        let current = player.position();
        let candidate = player.step_target(player.direction);

        if self.is_blocked(&current, &candidate, player_id) {
            trace!(
                area_id = self.area.id,
                player_id,
                candidate = %candidate,
                "Movement rejected"
            );
            return Ok(MoveOutcome::Collided);
        }

        if let Some(player) = self.state.players.get_mut(&player_id) {
            player.set_position(candidate);
        }
        self.state.dirty.insert(player_id);

        let door = self
            .area
            .doors
            .iter()
            .find(|door| door.is_triggered_by(&candidate));

        Ok(match door {
            Some(door) => MoveOutcome::ReachedDoor(*door),
            None => MoveOutcome::Moved,
        })
    }

    /// Take the set of players changed since the previous drain
    pub fn drain_dirty(&mut self) -> HashSet<PlayerId> {
        std::mem::take(&mut self.state.dirty)
    }

    /// Export the area for a client that just entered it
    pub fn snapshot(&self) -> AreaSnapshot {
        AreaSnapshot {
            width: self.area.width,
            height: self.area.height,
            tile_layers: self.area.layers.iter().map(|l| l.tiles.clone()).collect(),
            players: self.state.players.values().cloned().collect(),
        }
    }

    fn require(&self, player_id: PlayerId) -> Result<&Player, GameError> {
        self.state
            .players
            .get(&player_id)
            .ok_or(GameError::PlayerNotInArea {
                player: player_id,
                area: self.area.id,
            })
    }

    /// Test a candidate footprint against static planes and other players.
    ///
    /// Players already overlapping the mover's current footprint (shared
    /// spawn point, occupied door destination) are ignored so the two can
    /// walk apart.
    fn is_blocked(&self, current: &Rectangle, candidate: &Rectangle, mover: PlayerId) -> bool {
        self.area
            .static_planes
            .iter()
            .any(|plane| plane.overlaps(candidate))
            || self.state.players.values().any(|other| {
                let footprint = other.position();
                other.id != mover && !footprint.overlaps(current) && footprint.overlaps(candidate)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: u32 = 32;

    fn open_area(id: AreaId) -> Area {
        Area::new(id, 10, 10, TILE, Vec::new(), Vec::new(), Vec::new())
    }

    fn player_at(id: PlayerId, x: i32, y: i32) -> Player {
        Player::new(id, id as u64 + 100, format!("p{}", id), "knight", 1, x, y, 32, 8)
    }

    #[test]
    fn test_step_into_open_space() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0).with_direction(Direction::Right));
        guard.drain_dirty();

        let outcome = guard.apply_move(1).unwrap();

        assert_eq!(outcome, MoveOutcome::Moved);
        assert_eq!(
            guard.player(1).unwrap().position(),
            Rectangle::new(8, 0, 40, 32)
        );
        assert!(guard.drain_dirty().contains(&1));
    }

    #[test]
    fn test_boundary_collision() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 288, 0).with_direction(Direction::Right));
        guard.drain_dirty();

        let outcome = guard.apply_move(1).unwrap();

        assert_eq!(outcome, MoveOutcome::Collided);
        assert_eq!(
            guard.player(1).unwrap().position(),
            Rectangle::new(288, 0, 320, 32)
        );
        assert!(guard.drain_dirty().is_empty());
    }

    #[test]
    fn test_every_edge_is_bounded() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));

        assert!(!guard.check_move(1, Direction::Up).unwrap());
        assert!(!guard.check_move(1, Direction::Left).unwrap());
        assert!(guard.check_move(1, Direction::Down).unwrap());

        guard.dismiss(1);
        guard.admit(player_at(1, 288, 288));
        assert!(!guard.check_move(1, Direction::Down).unwrap());
        assert!(!guard.check_move(1, Direction::Right).unwrap());
    }

    #[test]
    fn test_static_obstacle_blocks() {
        let wall = Rectangle::new(64, 0, 96, 32);
        let area = Area::new(1, 10, 10, TILE, Vec::new(), vec![wall], Vec::new());
        let mut guard = area.lock();
        guard.admit(player_at(1, 32, 0).with_direction(Direction::Right));

        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Collided);
        // Moving away from the wall is fine
        guard.set_direction(1, Direction::Left).unwrap();
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Moved);
    }

    #[test]
    fn test_players_block_each_other() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0).with_direction(Direction::Right));
        guard.admit(player_at(2, 40, 0));

        // 8..40 touches 40..72 without overlapping
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Moved);
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Collided);

        // Once the other player leaves the way is clear
        guard.dismiss(2);
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Moved);
    }

    #[test]
    fn test_committed_moves_never_overlap() {
        let wall = Rectangle::new(128, 64, 160, 96);
        let area = Area::new(1, 10, 10, TILE, Vec::new(), vec![wall], Vec::new());
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 64).with_direction(Direction::Right));
        guard.admit(player_at(2, 64, 0).with_direction(Direction::Down));

        for _ in 0..40 {
            for id in [1, 2] {
                if guard.apply_move(id).unwrap() == MoveOutcome::Moved {
                    let mover = guard.player(id).unwrap().position();
                    assert!(!guard
                        .area()
                        .static_planes()
                        .iter()
                        .any(|p| p.overlaps(&mover)));
                    assert!(guard
                        .players()
                        .filter(|p| p.id != id)
                        .all(|p| !p.position().overlaps(&mover)));
                }
            }
        }
    }

    #[test]
    fn test_check_matches_apply() {
        let wall = Rectangle::new(96, 32, 128, 64);
        let area = Area::new(1, 10, 10, TILE, Vec::new(), vec![wall], Vec::new());

        let directions = [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ];
        let starts = [(0, 0), (64, 32), (96, 0), (288, 288), (100, 64)];

        for (x, y) in starts {
            for direction in directions {
                let mut guard = area.lock();
                guard.admit(player_at(1, x, y));
                guard.admit(player_at(2, 200, 200));

                let allowed = guard.check_move(1, direction).unwrap();
                guard.set_direction(1, direction).unwrap();
                let applied = guard.apply_move(1).unwrap();

                assert_eq!(allowed, applied != MoveOutcome::Collided);
                guard.dismiss(1);
                guard.dismiss(2);
            }
        }
    }

    #[test]
    fn test_check_move_does_not_mutate() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));
        guard.drain_dirty();

        assert!(guard.check_move(1, Direction::Down).unwrap());
        assert_eq!(guard.player(1).unwrap().x(), 0);
        assert_eq!(guard.player(1).unwrap().y(), 0);
        assert!(guard.drain_dirty().is_empty());
    }

    #[test]
    fn test_drain_dirty_is_idempotent() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));
        guard.admit(player_at(2, 64, 64));

        let first = guard.drain_dirty();
        assert_eq!(first.len(), 2);
        assert!(guard.drain_dirty().is_empty());
    }

    #[test]
    fn test_reached_door() {
        let door = Door::new(7, 1, Rectangle::new(100, 100, 132, 132), 2, 50, 50);
        let area = Area::new(1, 10, 10, TILE, Vec::new(), Vec::new(), vec![door]);
        let mut guard = area.lock();
        guard.admit(player_at(1, 60, 100).with_direction(Direction::Right));

        // 68..100 only touches the trigger
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Moved);
        // 76..108 overlaps it; the position is already committed
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::ReachedDoor(door));
        assert_eq!(guard.player(1).unwrap().x(), 76);
    }

    #[test]
    fn test_unknown_player() {
        let area = open_area(3);
        let mut guard = area.lock();

        assert_eq!(
            guard.apply_move(9),
            Err(GameError::PlayerNotInArea { player: 9, area: 3 })
        );
        assert!(guard.check_move(9, Direction::Up).is_err());
        assert!(guard.dismiss(9).is_none());
    }

    #[test]
    fn test_admit_sets_area_id() {
        let area = open_area(5);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));
        assert_eq!(guard.player(1).unwrap().area_id, 5);
    }

    #[test]
    fn test_snapshot() {
        let layer = Layer::new(2, 1, vec![3, 0]);
        let area = Area::new(1, 2, 1, TILE, vec![layer], Vec::new(), Vec::new());
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));

        let snapshot = guard.snapshot();
        assert_eq!(snapshot.width, 2);
        assert_eq!(snapshot.height, 1);
        assert_eq!(snapshot.tile_layers, vec![vec![3, 0]]);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].id, 1);
    }

    #[test]
    fn test_occupant_sessions() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 0, 0));
        guard.admit(player_at(2, 64, 0));

        assert_eq!(guard.occupant_sessions(None), vec![101, 102]);
        assert_eq!(guard.occupant_sessions(Some(1)), vec![102]);
    }

    #[test]
    fn test_area_locks_are_independent() {
        let a = open_area(1);
        let b = open_area(2);

        let mut held = a.lock();
        held.admit(player_at(1, 0, 0));

        // Taking the second lock while holding the first must not block
        let mut other = b.lock();
        other.admit(player_at(2, 0, 0));
        assert_eq!((held.player_count(), other.player_count()), (1, 1));
    }

    #[test]
    fn test_overlapping_players_can_separate() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 64, 64));
        guard.admit(player_at(2, 64, 64));

        for direction in [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ] {
            assert!(guard.check_move(1, direction).unwrap());
            assert!(guard.check_move(2, direction).unwrap());
        }

        guard.set_direction(1, Direction::Right).unwrap();
        for _ in 0..4 {
            assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Moved);
        }
        assert_eq!(guard.player(1).unwrap().x(), 96);

        // Apart again, so ordinary collision applies
        guard.set_direction(1, Direction::Left).unwrap();
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Collided);
    }

    #[test]
    fn test_overlap_only_excuses_the_overlapped_player() {
        let area = open_area(1);
        let mut guard = area.lock();
        guard.admit(player_at(1, 64, 64).with_direction(Direction::Right));
        guard.admit(player_at(2, 64, 64));
        guard.admit(player_at(3, 100, 64));

        // 72..104 would overlap player 3, who is not sharing the footprint
        assert_eq!(guard.apply_move(1).unwrap(), MoveOutcome::Collided);
        assert_eq!(guard.player(1).unwrap().x(), 64);
    }

    #[test]
    fn test_huge_area_does_not_overflow() {
        let area = Area::new(1, u32::MAX, u32::MAX, 64, Vec::new(), Vec::new(), Vec::new());
        assert_eq!(area.pixel_bounds(), Rectangle::new(0, 0, i32::MAX, i32::MAX));
        assert_eq!(area.static_planes().len(), 4);
    }
}
