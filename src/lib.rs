//! Tilerealm Game Server Library
//!
//! This library provides the core functionality for the Tilerealm server:
//! an authoritative simulation of players moving through a tile map split
//! into areas, with door relocation and periodic state broadcasts.
//!
//! ## Modules
//!
//! - `api` - HTTP health and info endpoints
//! - `auth` - Credential store and account management
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Geometry, areas, world construction and the dispatcher
//! - `net` - WebSocket connections and session management
//! - `protocol` - JSON command and event definitions

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{RealmError, Result};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
