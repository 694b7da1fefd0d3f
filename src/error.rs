//! Error handling module
//!
//! Defines custom error types for the Tilerealm server.

use std::io;

use thiserror::Error;

/// Main error type for the Tilerealm server
#[derive(Error, Debug)]
pub enum RealmError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// World construction errors
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Network-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Too many connections from {0}")]
    TooManyConnections(String),

    #[error("Write buffer full")]
    WriteBufferFull,
}

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

/// Authentication-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Invalid username format")]
    InvalidUsername,

    #[error("Invalid password format")]
    InvalidPassword,

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Area not found: {0}")]
    AreaNotFound(u32),

    #[error("Player {player} is not in area {area}")]
    PlayerNotInArea { player: u32, area: u32 },

    #[error("Cannot lock area {0} against itself")]
    SameArea(u32),
}

/// Errors raised while building the world from its description.
///
/// Any of these aborts startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("Only square tiles are supported (found {width}x{height})")]
    NonSquareTiles { width: u32, height: u32 },

    #[error("Invalid map dimensions: {width}x{height} tiles of size {tile_size}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        tile_size: u32,
    },

    #[error("Map has no tile layers")]
    NoLayers,

    #[error("Layer {layer} has {actual} tiles, expected {expected}")]
    LayerSizeMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate area id {0}")]
    DuplicateArea(u32),

    #[error("Area {0} is empty or lies outside the map")]
    InvalidAreaBounds(u32),

    #[error("Unknown tile id {0}")]
    UnknownTile(u32),

    #[error("Tile {0} has a bounding box outside the tile")]
    InvalidBoundingBox(u32),

    #[error("Duplicate door id {0}")]
    DuplicateDoor(u32),

    #[error("Door {0} trigger is not inside any area")]
    UnresolvedDoorSource(u32),

    #[error("Door {0} destination is not inside any area")]
    UnresolvedDoorTarget(u32),
}

/// Result type alias for Tilerealm operations
pub type Result<T> = std::result::Result<T, RealmError>;
