//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::area::AreaId;
use crate::game::player::Direction;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name reported by the info API
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// WebSocket port for game clients
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// HTTP info API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path to the parsed world description (JSON)
    #[serde(default = "default_world_path")]
    pub world_path: PathBuf,

    /// Delay between the end of one state broadcast tick and the start of the next
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Minimum time between movement steps of one player
    #[serde(default = "default_walk_delay")]
    pub walk_delay_ms: u64,

    /// Pixels travelled per movement step
    #[serde(default = "default_player_speed")]
    pub player_speed: u32,

    /// Side of the square player footprint in pixels
    #[serde(default = "default_entity_size")]
    pub entity_size: u32,

    /// Maximum number of concurrent connections
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Maximum concurrent connections from one IP
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: u32,

    /// Outbound events buffered per connection before new ones are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Sprite given to newly created accounts
    #[serde(default = "default_sprite")]
    pub default_sprite: String,

    /// Home position of newly created accounts
    #[serde(default)]
    pub spawn: SpawnPoint,

    /// Development mode flag (accept any login)
    #[serde(default)]
    pub dev_mode: bool,

    /// Accounts created at startup
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// An account declared in the configuration file
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub username: String,
    /// Argon2 PHC string
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Plain password, hashed at startup. Meant for local setups.
    #[serde(default)]
    pub password: Option<String>,
    /// Falls back to `default_sprite`
    #[serde(default)]
    pub sprite: Option<String>,
    /// Falls back to the server-wide `spawn`
    #[serde(default)]
    pub spawn: Option<SpawnPoint>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl std::fmt::Debug for AccountSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSeed")
            .field("username", &self.username)
            .field("sprite", &self.sprite)
            .field("spawn", &self.spawn)
            .field("direction", &self.direction)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// A position inside an area, in area-local pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPoint {
    #[serde(default = "default_spawn_area")]
    pub area_id: AreaId,
    #[serde(default = "default_spawn_coordinate")]
    pub x: i32,
    #[serde(default = "default_spawn_coordinate")]
    pub y: i32,
}

// Default value functions
fn default_server_name() -> String {
    "Tilerealm".to_string()
}

fn default_websocket_port() -> u16 {
    8080
}

fn default_api_port() -> u16 {
    8081
}

fn default_world_path() -> PathBuf {
    PathBuf::from("data/world.json")
}

fn default_tick_rate() -> u64 {
    200
}

fn default_walk_delay() -> u64 {
    100
}

fn default_player_speed() -> u32 {
    8
}

fn default_entity_size() -> u32 {
    32
}

fn default_max_players() -> u32 {
    500
}

fn default_max_connections_per_ip() -> u32 {
    10
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_sprite() -> String {
    "player".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_spawn_area() -> AreaId {
    1
}

fn default_spawn_coordinate() -> i32 {
    32
}

impl Default for SpawnPoint {
    fn default() -> Self {
        Self {
            area_id: default_spawn_area(),
            x: default_spawn_coordinate(),
            y: default_spawn_coordinate(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            websocket_port: default_websocket_port(),
            api_port: default_api_port(),
            world_path: default_world_path(),
            tick_rate_ms: default_tick_rate(),
            walk_delay_ms: default_walk_delay(),
            player_speed: default_player_speed(),
            entity_size: default_entity_size(),
            max_players: default_max_players(),
            max_connections_per_ip: default_max_connections_per_ip(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            default_sprite: default_sprite(),
            spawn: SpawnPoint::default(),
            dev_mode: false,
            accounts: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("TILEREALM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration document; missing keys take their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TILEREALM_SERVER_NAME") {
            self.server_name = val;
        }
        if let Some(port) = env_parse("TILEREALM_WEBSOCKET_PORT") {
            self.websocket_port = port;
        }
        if let Some(port) = env_parse("TILEREALM_API_PORT") {
            self.api_port = port;
        }
        if let Ok(val) = env::var("TILEREALM_WORLD_PATH") {
            self.world_path = PathBuf::from(val);
        }
        if let Some(ms) = env_parse("TILEREALM_TICK_RATE_MS") {
            self.tick_rate_ms = ms;
        }
        if let Some(ms) = env_parse("TILEREALM_WALK_DELAY_MS") {
            self.walk_delay_ms = ms;
        }
        if let Some(speed) = env_parse("TILEREALM_PLAYER_SPEED") {
            self.player_speed = speed;
        }
        if let Some(size) = env_parse("TILEREALM_ENTITY_SIZE") {
            self.entity_size = size;
        }
        if let Some(max) = env_parse("TILEREALM_MAX_PLAYERS") {
            self.max_players = max;
        }
        if let Some(max) = env_parse("TILEREALM_MAX_CONNECTIONS_PER_IP") {
            self.max_connections_per_ip = max;
        }
        if let Some(capacity) = env_parse("TILEREALM_OUTBOUND_QUEUE_CAPACITY") {
            self.outbound_queue_capacity = capacity;
        }
        if let Ok(val) = env::var("TILEREALM_DEV_MODE") {
            self.dev_mode = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.websocket_port == self.api_port {
            anyhow::bail!("WebSocket port and API port must be different");
        }

        if self.max_players == 0 || self.max_players > 10000 {
            anyhow::bail!("Max players must be between 1 and 10000");
        }
        if self.max_connections_per_ip == 0 {
            anyhow::bail!("Max connections per IP must be at least 1");
        }

        if self.tick_rate_ms < 10 || self.tick_rate_ms > 5000 {
            anyhow::bail!("Tick rate must be between 10ms and 5000ms");
        }
        if self.walk_delay_ms == 0 || self.walk_delay_ms > 5000 {
            anyhow::bail!("Walk delay must be between 1ms and 5000ms");
        }

        if self.player_speed == 0 {
            anyhow::bail!("Player speed must be positive");
        }
        if self.entity_size == 0 {
            anyhow::bail!("Entity size must be positive");
        }
        if self.outbound_queue_capacity == 0 {
            anyhow::bail!("Outbound queue capacity must be positive");
        }

        for account in &self.accounts {
            if account.password.is_some() == account.password_hash.is_some() {
                anyhow::bail!(
                    "Account {} needs exactly one of password or password_hash",
                    account.username
                );
            }
        }

        Ok(())
    }

    /// Delay between state broadcast ticks
    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }

    /// Delay between movement steps
    pub fn walk_delay(&self) -> Duration {
        Duration::from_millis(self.walk_delay_ms)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse().ok())
}
