//! Client/server message definitions
//!
//! Inbound commands and outbound events are internally tagged JSON objects;
//! the tag lives in the `header` field and every other field is camelCase.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, ProtocolError};
use crate::game::area::AreaSnapshot;
use crate::game::player::{Direction, Player, PlayerId};

/// A command sent by a client
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "header", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Login { username: String, password: String },
    MoveStart { direction: Direction },
    MoveStop,
    Disconnect,
}

impl Command {
    /// Get the wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::MoveStart { .. } => "moveStart",
            Command::MoveStop => "moveStop",
            Command::Disconnect => "disconnect",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Command::MoveStart { direction } => f
                .debug_struct("MoveStart")
                .field("direction", direction)
                .finish(),
            Command::MoveStop => f.write_str("MoveStop"),
            Command::Disconnect => f.write_str("Disconnect"),
        }
    }
}

/// Reason a login was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginFailure {
    InvalidLogin,
    AlreadyLoggedIn,
    AccountDisabled,
    ServerError,
}

impl From<&AuthError> for LoginFailure {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidUsername
            | AuthError::InvalidPassword => LoginFailure::InvalidLogin,
            AuthError::AccountDisabled => LoginFailure::AccountDisabled,
            AuthError::RegistrationFailed(_) => LoginFailure::ServerError,
        }
    }
}

/// Public view of a player sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub username: String,
    pub sprite: String,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
}

impl From<&Player> for PlayerInfo {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            username: player.username.clone(),
            sprite: player.sprite.clone(),
            x: player.x(),
            y: player.y(),
            direction: player.direction,
        }
    }
}

/// One entry of a state delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionChange {
    pub player_id: PlayerId,
    pub x: i32,
    pub y: i32,
}

impl From<&Player> for PositionChange {
    fn from(player: &Player) -> Self {
        Self {
            player_id: player.id,
            x: player.x(),
            y: player.y(),
        }
    }
}

/// An event sent to one client or broadcast to an area's occupants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "header", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    LoginAccepted {
        player_id: PlayerId,
    },
    LoginRejected {
        reason: LoginFailure,
    },
    MapSnapshot {
        width: u32,
        height: u32,
        tile_layers: Vec<Vec<u32>>,
        players: Vec<PlayerInfo>,
    },
    EntityAppeared {
        player: PlayerInfo,
    },
    EntityDisappeared {
        player_id: PlayerId,
    },
    MoveStarted {
        player_id: PlayerId,
        direction: Direction,
    },
    MoveStopped {
        player_id: PlayerId,
        x: i32,
        y: i32,
    },
    StateDelta {
        changes: Vec<PositionChange>,
    },
}

impl OutboundEvent {
    /// Get the wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::LoginAccepted { .. } => "loginAccepted",
            OutboundEvent::LoginRejected { .. } => "loginRejected",
            OutboundEvent::MapSnapshot { .. } => "mapSnapshot",
            OutboundEvent::EntityAppeared { .. } => "entityAppeared",
            OutboundEvent::EntityDisappeared { .. } => "entityDisappeared",
            OutboundEvent::MoveStarted { .. } => "moveStarted",
            OutboundEvent::MoveStopped { .. } => "moveStopped",
            OutboundEvent::StateDelta { .. } => "stateDelta",
        }
    }

    /// Stop notification carrying the player's current position
    pub fn move_stopped(player: &Player) -> Self {
        OutboundEvent::MoveStopped {
            player_id: player.id,
            x: player.x(),
            y: player.y(),
        }
    }
}

impl From<AreaSnapshot> for OutboundEvent {
    fn from(snapshot: AreaSnapshot) -> Self {
        OutboundEvent::MapSnapshot {
            width: snapshot.width,
            height: snapshot.height,
            tile_layers: snapshot.tile_layers,
            players: snapshot.players.iter().map(PlayerInfo::from).collect(),
        }
    }
}

/// Decode a command from a text frame
pub fn decode_command(text: &str) -> Result<Command, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

/// Encode an event into a text frame
pub fn encode_event(event: &OutboundEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_commands() {
        let login = decode_command(r#"{"header":"login","username":"alice","password":"pw"}"#)
            .unwrap();
        assert_eq!(
            login,
            Command::Login {
                username: "alice".to_string(),
                password: "pw".to_string()
            }
        );

        let start = decode_command(r#"{"header":"moveStart","direction":"left"}"#).unwrap();
        assert_eq!(
            start,
            Command::MoveStart {
                direction: Direction::Left
            }
        );

        assert_eq!(
            decode_command(r#"{"header":"moveStop"}"#).unwrap(),
            Command::MoveStop
        );
        assert_eq!(
            decode_command(r#"{"header":"disconnect"}"#).unwrap(),
            Command::Disconnect
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode_command("not json").is_err());
        assert!(decode_command(r#"{"header":"teleport"}"#).is_err());
        assert!(decode_command(r#"{"header":"moveStart","direction":"north"}"#).is_err());
    }

    #[test]
    fn test_login_debug_hides_password() {
        let login = Command::Login {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", login);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_encode_events() {
        let event = OutboundEvent::MoveStopped {
            player_id: 3,
            x: 8,
            y: 16,
        };
        let value: serde_json::Value = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"header": "moveStopped", "playerId": 3, "x": 8, "y": 16})
        );

        let event = OutboundEvent::StateDelta {
            changes: vec![PositionChange {
                player_id: 1,
                x: 40,
                y: 0,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"header": "stateDelta", "changes": [{"playerId": 1, "x": 40, "y": 0}]})
        );
    }

    #[test]
    fn test_encode_login_rejected() {
        let event = OutboundEvent::LoginRejected {
            reason: LoginFailure::from(&AuthError::InvalidCredentials),
        };
        assert_eq!(
            encode_event(&event).unwrap(),
            r#"{"header":"loginRejected","reason":"invalidLogin"}"#
        );
    }

    #[test]
    fn test_login_failure_mapping() {
        assert_eq!(
            LoginFailure::from(&AuthError::AccountDisabled),
            LoginFailure::AccountDisabled
        );
        assert_eq!(
            LoginFailure::from(&AuthError::RegistrationFailed("hash".to_string())),
            LoginFailure::ServerError
        );
        assert_eq!(
            LoginFailure::from(&AuthError::InvalidUsername),
            LoginFailure::InvalidLogin
        );
    }

    #[test]
    fn test_snapshot_event() {
        let player = Player::new(7, 1, "bob", "mage", 2, 50, 50, 32, 8);
        let snapshot = AreaSnapshot {
            width: 2,
            height: 1,
            tile_layers: vec![vec![1, 0]],
            players: vec![player],
        };

        let value = serde_json::to_value(OutboundEvent::from(snapshot)).unwrap();
        assert_eq!(
            value,
            json!({
                "header": "mapSnapshot",
                "width": 2,
                "height": 1,
                "tileLayers": [[1, 0]],
                "players": [{
                    "id": 7,
                    "username": "bob",
                    "sprite": "mage",
                    "x": 50,
                    "y": 50,
                    "direction": "down"
                }]
            })
        );
    }
}
