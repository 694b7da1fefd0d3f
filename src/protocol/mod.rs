//! Protocol module
//!
//! JSON messages exchanged with clients over WebSocket text frames:
//! - Inbound commands (login, movement, disconnect)
//! - Outbound events (login result, map snapshots, entity updates, deltas)

pub mod messages;

pub use messages::{
    decode_command, encode_event, Command, LoginFailure, OutboundEvent, PlayerInfo,
    PositionChange,
};
