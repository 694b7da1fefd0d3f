//! Authentication service module
//!
//! Provides authentication and account management for the game server.
//! Supports both development mode (accepts all logins) and production mode
//! (validates against accounts seeded from the configuration).
//!
//! The dispatcher only sees the [`CredentialStore`] trait, so the in-memory
//! [`AuthService`] can be swapped for a persistent store.

use std::collections::HashMap;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{AccountSeed, SpawnPoint};
use crate::error::AuthError;
use crate::game::player::Direction;

/// Player account information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Unique account ID
    pub id: u64,
    /// Username (normalized)
    pub username: String,
    /// Password hash (Argon2), empty for dev accounts
    pub password_hash: String,
    /// Sprite sheet shown to other players
    pub sprite: String,
    /// Home area and position on login
    pub spawn: SpawnPoint,
    /// Facing direction on login
    pub direction: Direction,
    /// Whether the account is enabled
    pub enabled: bool,
}

impl Account {
    /// Create a development account (no password hashing)
    pub fn dev_account(id: u64, username: &str, sprite: &str, spawn: SpawnPoint) -> Self {
        Self {
            id,
            username: normalize_username(username),
            password_hash: String::new(),
            sprite: sprite.to_string(),
            spawn,
            direction: Direction::default(),
            enabled: true,
        }
    }

    /// Verify the password against the stored hash
    pub fn verify_password(&self, password: &str) -> bool {
        if self.password_hash.is_empty() {
            // Dev account - no password check
            return true;
        }
        verify_password(password, &self.password_hash)
    }
}

/// Source of truth for login credentials
pub trait CredentialStore: Send + Sync {
    /// Check a username/password pair and return the matching account
    fn authenticate(&self, username: &str, password: &str) -> Result<Account, AuthError>;
}

/// In-memory account store
pub struct AuthService {
    /// Whether running in development mode
    dev_mode: bool,
    /// Spawn point for newly created accounts
    default_spawn: SpawnPoint,
    /// Sprite for newly created accounts
    default_sprite: String,
    /// Account storage (normalized username -> account)
    accounts: RwLock<HashMap<String, Account>>,
    /// Next available account ID
    next_id: RwLock<u64>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(dev_mode: bool, default_spawn: SpawnPoint, default_sprite: impl Into<String>) -> Self {
        Self {
            dev_mode,
            default_spawn,
            default_sprite: default_sprite.into(),
            accounts: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// Add an account declared in the configuration.
    ///
    /// The account keeps its own sprite, spawn point and direction when the
    /// seed names them and falls back to the server defaults otherwise.
    pub fn add_account(&self, seed: &AccountSeed) -> Result<Account, AuthError> {
        let username_normalized = normalize_username(&seed.username);

        // Validate username
        if username_normalized.is_empty() || username_normalized.chars().count() > 12 {
            return Err(AuthError::InvalidUsername);
        }

        let password_hash = match (&seed.password_hash, &seed.password) {
            (Some(hash), None) => {
                PasswordHash::new(hash).map_err(|e| {
                    AuthError::RegistrationFailed(format!("Invalid password hash: {}", e))
                })?;
                hash.clone()
            }
            (None, Some(password)) => {
                // Validate password
                if password.len() < 4 || password.len() > 20 {
                    return Err(AuthError::InvalidPassword);
                }
                hash_password(password)?
            }
            _ => return Err(AuthError::InvalidPassword),
        };

        let mut accounts = self.accounts.write();

        if accounts.contains_key(&username_normalized) {
            return Err(AuthError::RegistrationFailed(format!(
                "Username {} already exists",
                username_normalized
            )));
        }

        let account = Account {
            id: self.allocate_id(),
            username: username_normalized.clone(),
            password_hash,
            sprite: seed
                .sprite
                .clone()
                .unwrap_or_else(|| self.default_sprite.clone()),
            spawn: seed.spawn.unwrap_or(self.default_spawn),
            direction: seed.direction,
            enabled: seed.enabled,
        };
        accounts.insert(username_normalized.clone(), account.clone());

        debug!(
            username = %username_normalized,
            account_id = account.id,
            enabled = account.enabled,
            "Account added"
        );

        Ok(account)
    }

    /// Get or create a development account
    fn get_or_create_dev_account(&self, username: &str) -> Account {
        let mut accounts = self.accounts.write();

        if let Some(account) = accounts.get(username) {
            return account.clone();
        }

        let id = self.allocate_id();
        let account = Account::dev_account(id, username, &self.default_sprite, self.default_spawn);
        accounts.insert(username.to_string(), account.clone());

        debug!(
            username = %username,
            account_id = id,
            "Created dev account"
        );

        account
    }

    fn allocate_id(&self) -> u64 {
        let mut next_id = self.next_id.write();
        let id = *next_id;
        *next_id += 1;
        id
    }

    /// Number of known accounts
    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    /// Check if running in dev mode
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}

impl CredentialStore for AuthService {
    fn authenticate(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let username_normalized = normalize_username(username);

        if username_normalized.is_empty() {
            return Err(AuthError::InvalidUsername);
        }

        if self.dev_mode {
            debug!(
                username = %username_normalized,
                "Dev mode authentication - auto-accepting"
            );
            let account = self.get_or_create_dev_account(&username_normalized);
            if !account.enabled {
                return Err(AuthError::AccountDisabled);
            }
            return Ok(account);
        }

        let accounts = self.accounts.read();
        let account = accounts
            .get(&username_normalized)
            .ok_or(AuthError::InvalidCredentials)?;

        if !account.enabled {
            return Err(AuthError::AccountDisabled);
        }

        if !account.verify_password(password) {
            warn!(username = %username_normalized, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        info!(
            username = %username_normalized,
            account_id = account.id,
            "Authentication successful"
        );

        Ok(account.clone())
    }
}

/// Normalize a username (lowercase, trim, replace spaces with underscores)
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase().replace(' ', "_")
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::RegistrationFailed(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> SpawnPoint {
        SpawnPoint {
            area_id: 1,
            x: 64,
            y: 64,
        }
    }

    fn service(dev_mode: bool) -> AuthService {
        AuthService::new(dev_mode, spawn(), "player")
    }

    fn seed(username: &str, password: &str) -> AccountSeed {
        AccountSeed {
            username: username.to_string(),
            password_hash: None,
            password: Some(password.to_string()),
            sprite: None,
            spawn: None,
            direction: Direction::default(),
            enabled: true,
        }
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("Player"), "player");
        assert_eq!(normalize_username("  Test User  "), "test_user");
        assert_eq!(normalize_username("UPPER_CASE"), "upper_case");
    }

    #[test]
    fn test_dev_mode_auth() {
        let auth = service(true);
        assert!(auth.is_dev_mode());

        let account = auth.authenticate("Test User", "any_password").unwrap();
        assert_eq!(account.username, "test_user");
        assert_eq!(account.spawn, spawn());
        assert_eq!(account.sprite, "player");

        // Same account on the next login
        let again = auth.authenticate("test_user", "other").unwrap();
        assert_eq!(again.id, account.id);
        assert_eq!(auth.account_count(), 1);
    }

    #[test]
    fn test_seeded_account_auth() {
        let auth = service(false);
        assert!(!auth.is_dev_mode());

        auth.add_account(&seed("newuser", "password123")).unwrap();

        let account = auth.authenticate("NewUser", "password123").unwrap();
        assert_eq!(account.username, "newuser");
        assert!(!account.password_hash.is_empty());
        assert_eq!(account.spawn, spawn());
        assert_eq!(account.sprite, "player");

        assert_eq!(
            auth.authenticate("newuser", "wrongpassword"),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.authenticate("nobody", "password123"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_seed_keeps_its_own_home() {
        let auth = service(false);
        let home = SpawnPoint {
            area_id: 3,
            x: 10,
            y: 20,
        };
        let mut knight = seed("knight", "password123");
        knight.sprite = Some("knight".to_string());
        knight.spawn = Some(home);
        knight.direction = Direction::Up;

        auth.add_account(&knight).unwrap();

        let account = auth.authenticate("knight", "password123").unwrap();
        assert_eq!(account.spawn, home);
        assert_eq!(account.sprite, "knight");
        assert_eq!(account.direction, Direction::Up);
    }

    #[test]
    fn test_seed_with_password_hash() {
        let auth = service(false);
        let mut hashed = seed("hashed", "unused");
        hashed.password = None;
        hashed.password_hash = Some(hash_password("letmein").unwrap());

        auth.add_account(&hashed).unwrap();
        assert!(auth.authenticate("hashed", "letmein").is_ok());

        let mut broken = seed("broken", "unused");
        broken.password = None;
        broken.password_hash = Some("not-a-hash".to_string());
        assert!(matches!(
            auth.add_account(&broken),
            Err(AuthError::RegistrationFailed(_))
        ));
    }

    #[test]
    fn test_duplicate_account() {
        let auth = service(false);

        assert!(auth.add_account(&seed("testuser", "password123")).is_ok());
        assert!(matches!(
            auth.add_account(&seed("TestUser", "different")),
            Err(AuthError::RegistrationFailed(_))
        ));
        assert_eq!(auth.account_count(), 1);
    }

    #[test]
    fn test_account_disabled() {
        let auth = service(false);
        let mut disabled = seed("testuser", "password123");
        disabled.enabled = false;

        auth.add_account(&disabled).unwrap();

        assert_eq!(
            auth.authenticate("testuser", "password123"),
            Err(AuthError::AccountDisabled)
        );
    }

    #[test]
    fn test_password_hashing() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong_password", &hash));
        assert!(!verify_password(password, "not-a-hash"));
    }

    #[test]
    fn test_invalid_username() {
        let auth = service(false);

        assert_eq!(
            auth.add_account(&seed("verylongusername", "password123")).err(),
            Some(AuthError::InvalidUsername)
        );
        assert_eq!(
            auth.add_account(&seed("   ", "password123")).err(),
            Some(AuthError::InvalidUsername)
        );
        assert_eq!(
            auth.authenticate("", "password123"),
            Err(AuthError::InvalidUsername)
        );
    }

    #[test]
    fn test_invalid_password() {
        let auth = service(false);

        assert_eq!(
            auth.add_account(&seed("testuser", "abc")).err(),
            Some(AuthError::InvalidPassword)
        );
        assert_eq!(
            auth.add_account(&seed("testuser", "ab".repeat(15).as_str())).err(),
            Some(AuthError::InvalidPassword)
        );

        let mut neither = seed("testuser", "unused");
        neither.password = None;
        assert_eq!(
            auth.add_account(&neither).err(),
            Some(AuthError::InvalidPassword)
        );
    }
}
