//! services/api/src/sessions.rs
//!
//! Account registration, login and bearer-token sessions.
//!
//! Passwords are stored as Argon2 PHC strings. Sessions live only in memory and
//! expire a fixed time after issuance; there is no renewal.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use study_assistant_core::domain::AuthSession;
use study_assistant_core::ports::{AccountStore, PortError, PortResult};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::storage::validate_username;

pub const MIN_USERNAME_CHARS: usize = 3;

pub struct SessionManager {
    accounts: Arc<dyn AccountStore>,
    sessions: RwLock<HashMap<String, AuthSession>>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(accounts: Arc<dyn AccountStore>, timeout: Duration) -> Self {
        Self {
            accounts,
            sessions: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Creates an account and signs it in.
    pub async fn register(&self, username: &str, password: &str) -> PortResult<AuthSession> {
        let username = username.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(PortError::Validation("Username and password are required".to_string()));
        }
        if username.chars().count() < MIN_USERNAME_CHARS {
            return Err(PortError::Validation(format!(
                "Username must be at least {MIN_USERNAME_CHARS} characters"
            )));
        }
        validate_username(username)?;
        // Fail before the account is written if no token could be issued.
        self.expiry_from(Utc::now())?;

        let password_hash = hash_password(password).await?;
        self.accounts.create_account(username, &password_hash).await?;
        info!("Registered user '{}'", username);

        self.issue(username).await
    }

    /// Signs in an existing account. Earlier sessions stay valid.
    pub async fn login(&self, username: &str, password: &str) -> PortResult<AuthSession> {
        let username = username.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(PortError::Validation("Username and password are required".to_string()));
        }

        let account = self.accounts.get_account(username).await?;
        if !verify_password(password, &account.password_hash).await? {
            return Err(PortError::Unauthorized("Incorrect password".to_string()));
        }

        self.issue(&account.username).await
    }

    /// Invalidates every session of the token's owner, returning how many were dropped.
    pub async fn logout(&self, token: &str) -> PortResult<usize> {
        let username = self.authenticate(token).await?;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.username != username);
        let removed = before - sessions.len();
        info!("Logged out '{}' ({} session(s) invalidated)", username, removed);
        Ok(removed)
    }

    /// Resolves a bearer token to its owning username.
    pub async fn authenticate(&self, token: &str) -> PortResult<String> {
        self.authenticate_at(token, Utc::now()).await
    }

    /// Like `authenticate`, evaluated at `now`. Expired sessions are removed.
    pub async fn authenticate_at(&self, token: &str, now: DateTime<Utc>) -> PortResult<String> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PortError::Unauthorized("Missing token".to_string()));
        }

        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return Err(PortError::Unauthorized("Invalid token".to_string())),
                Some(session) if !session.is_expired_at(now) => return Ok(session.username.clone()),
                Some(_) => {}
            }
        }

        self.sessions.write().await.remove(token);
        Err(PortError::Unauthorized("Token expired".to_string()))
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn expiry_from(&self, created_at: DateTime<Utc>) -> PortResult<DateTime<Utc>> {
        created_at
            .checked_add_signed(self.timeout)
            .ok_or_else(|| PortError::Unexpected("Session timeout is out of range".to_string()))
    }

    async fn issue(&self, username: &str) -> PortResult<AuthSession> {
        let created_at = Utc::now();
        let session = AuthSession {
            token: Uuid::new_v4().to_string(),
            username: username.to_string(),
            created_at,
            expires_at: self.expiry_from(created_at)?,
        };
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }
}

/// Hashes on the blocking pool; Argon2 is CPU-bound.
async fn hash_password(password: &str) -> PortResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                PortError::Unexpected("Failed to hash password".to_string())
            })
    })
    .await
    .map_err(|e| PortError::Unexpected(e.to_string()))?
}

async fn verify_password(password: &str, stored_hash: &str) -> PortResult<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&stored_hash).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            PortError::Unexpected("Authentication error".to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    })
    .await
    .map_err(|e| PortError::Unexpected(e.to_string()))?
}
