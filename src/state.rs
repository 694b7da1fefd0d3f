//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::error::{RealmError, Result};
use crate::game::dispatcher::{Dispatcher, DispatcherSettings};
use crate::game::world::{World, WorldDescription};
use crate::net::session::SessionManager;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// The game map
    pub world: Arc<World>,
    /// Session manager for tracking connected clients
    pub session_manager: Arc<SessionManager>,
    /// Authentication service
    pub auth: Arc<AuthService>,
    /// Command router and tick driver
    pub dispatcher: Arc<Dispatcher>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Load the world named by the configuration and wire up the services
    pub async fn load(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let world = load_world(&config.world_path).await?;
        Self::new(config, world, shutdown_tx)
    }

    /// Create the application state around an already built world.
    ///
    /// Fails if a configured account cannot be added.
    pub fn new(
        config: ServerConfig,
        world: World,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        // A step longer than a tile could jump over a one-tile wall
        if config.player_speed > world.tile_size() {
            warn!(
                player_speed = config.player_speed,
                tile_size = world.tile_size(),
                "Player speed exceeds tile size, thin walls can be skipped"
            );
        }

        let world = Arc::new(world);

        let session_manager = Arc::new(SessionManager::with_limits(
            config.outbound_queue_capacity,
            config.max_players as usize,
            config.max_connections_per_ip as usize,
        ));

        let auth = AuthService::new(
            config.dev_mode,
            config.spawn,
            config.default_sprite.clone(),
        );
        for seed in &config.accounts {
            auth.add_account(seed)?;
        }

        if auth.is_dev_mode() {
            info!("Auth service running in DEVELOPMENT mode - all logins accepted");
        } else if auth.account_count() == 0 {
            warn!("No accounts configured and dev mode is off, every login will be rejected");
        } else {
            info!(accounts = auth.account_count(), "Accounts loaded");
        }
        let auth = Arc::new(auth);

        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherSettings::from(&config),
            world.clone(),
            auth.clone(),
            session_manager.clone(),
        ));

        Ok(Self {
            config,
            world,
            session_manager,
            auth,
            dispatcher,
            shutdown_tx,
        })
    }

    /// Number of logged-in players
    pub fn players_online(&self) -> usize {
        self.dispatcher.player_count()
    }
}

/// Read and build the world description at `path`
pub async fn load_world(path: &Path) -> Result<World> {
    let content = tokio::fs::read_to_string(path).await?;
    let description: WorldDescription = serde_json::from_str(&content).map_err(|e| {
        RealmError::Config(format!(
            "Failed to parse world description {}: {}",
            path.display(),
            e
        ))
    })?;

    let world = World::build(&description)?;
    info!(
        path = %path.display(),
        areas = world.area_count(),
        "World loaded"
    );
    Ok(world)
}
