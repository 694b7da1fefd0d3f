//! Player module
//!
//! The area-resident half of a player entity:
//! - Identity (id, session, username, sprite)
//! - Position footprint and facing direction
//! - Movement speed
//!
//! The movement state machine lives in the dispatcher's registry entry for
//! the player; see [`crate::game::dispatcher`].

use serde::{Deserialize, Serialize};

use crate::game::area::AreaId;
use crate::game::geometry::Rectangle;
use crate::net::session::SessionId;

/// Player identifier, unique among connected players
pub type PlayerId = u32;

/// Facing/movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit vector in screen coordinates (y grows downwards)
    pub fn unit_vector(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Get the wire name of the direction
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Movement state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementState {
    #[default]
    Idle,
    Moving,
}

/// A player entity inside an area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Player id
    pub id: PlayerId,
    /// Owning connection
    pub session_id: SessionId,
    pub username: String,
    /// Sprite sheet name used by clients
    pub sprite: String,
    /// Area currently holding this player
    pub area_id: AreaId,
    /// Footprint in area-local pixels
    position: Rectangle,
    pub direction: Direction,
    /// Pixels travelled per movement step
    pub speed: i32,
}

impl Player {
    /// Create a player with a square footprint whose top-left corner is at (x, y)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PlayerId,
        session_id: SessionId,
        username: impl Into<String>,
        sprite: impl Into<String>,
        area_id: AreaId,
        x: i32,
        y: i32,
        footprint: i32,
        speed: i32,
    ) -> Self {
        Self {
            id,
            session_id,
            username: username.into(),
            sprite: sprite.into(),
            area_id,
            position: Rectangle::from_size(x, y, footprint, footprint),
            direction: Direction::default(),
            speed,
        }
    }

    /// Set the initial facing direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn position(&self) -> Rectangle {
        self.position
    }

    pub fn x(&self) -> i32 {
        self.position.x1
    }

    pub fn y(&self) -> i32 {
        self.position.y1
    }

    /// Footprint after one step in `direction`
    pub fn step_target(&self, direction: Direction) -> Rectangle {
        let (dx, dy) = direction.unit_vector();
        self.position.translate(dx * self.speed, dy * self.speed)
    }

    pub(crate) fn set_position(&mut self, position: Rectangle) {
        self.position = position;
    }

    /// Move the footprint to (x, y) in another area, keeping its size
    pub fn place_at(&mut self, area_id: AreaId, x: i32, y: i32) {
        self.area_id = area_id;
        self.position =
            Rectangle::from_size(x, y, self.position.width(), self.position.height());
    }
}
