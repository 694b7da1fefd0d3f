//! Networking module
//!
//! This module handles all network-related functionality for the Tilerealm server:
//! - WebSocket handling for game clients
//! - Session management and outbound event queues
//! - Connection lifecycle

pub mod handler;
pub mod session;
