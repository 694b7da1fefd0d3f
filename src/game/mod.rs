//! Game module
//!
//! This module contains the core game logic for the Tilerealm server:
//! - Collision geometry
//! - Areas (spatial partitions with their own lock) and doors
//! - World construction from a parsed map description
//! - Player entities and the movement dispatcher

pub mod area;
pub mod dispatcher;
pub mod door;
pub mod geometry;
pub mod player;
pub mod world;
