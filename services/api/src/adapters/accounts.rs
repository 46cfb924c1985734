//! services/api/src/adapters/accounts.rs
//!
//! The account adapter, the concrete implementation of the `AccountStore` port.
//! All accounts live in memory and are persisted as one JSON object
//! (`username -> {password_hash, created_at}`), rewritten wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use study_assistant_core::domain::UserAccount;
use study_assistant_core::ports::{AccountStore, PortError, PortResult};
use tokio::sync::Mutex;
use tracing::info;

use crate::storage::{io_error, write_atomic};

//=========================================================================================
// Persisted Record
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRecord {
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl AccountRecord {
    fn to_domain(&self, username: &str) -> UserAccount {
        UserAccount {
            username: username.to_string(),
            password_hash: self.password_hash.clone(),
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An account store backed by a single JSON file.
pub struct JsonAccountStore {
    path: PathBuf,
    accounts: Mutex<BTreeMap<String, AccountRecord>>,
}

impl JsonAccountStore {
    /// Opens the users file, starting empty if it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> PortResult<Self> {
        let path = path.as_ref().to_path_buf();
        let accounts: BTreeMap<String, AccountRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PortError::Unexpected(format!("Corrupt users file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error(e)),
        };
        info!("Loaded {} user account(s) from {}", accounts.len(), path.display());
        Ok(Self {
            path,
            accounts: Mutex::new(accounts),
        })
    }

    async fn write(&self, accounts: &BTreeMap<String, AccountRecord>) -> PortResult<()> {
        let bytes = serde_json::to_vec_pretty(accounts).map_err(|e| PortError::Unexpected(e.to_string()))?;
        write_atomic(&self.path, &bytes).await
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn create_account(&self, username: &str, password_hash: &str) -> PortResult<UserAccount> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(username) {
            return Err(PortError::Conflict(format!("Username '{username}' is already taken")));
        }

        let record = AccountRecord {
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        accounts.insert(username.to_string(), record.clone());

        // Roll the insert back if the file cannot be written.
        if let Err(e) = self.write(&accounts).await {
            accounts.remove(username);
            return Err(e);
        }
        Ok(record.to_domain(username))
    }

    async fn get_account(&self, username: &str) -> PortResult<UserAccount> {
        self.accounts
            .lock()
            .await
            .get(username)
            .map(|record| record.to_domain(username))
            .ok_or_else(|| PortError::NotFound(format!("User '{username}' not found")))
    }

    async fn list_usernames(&self) -> PortResult<Vec<String>> {
        Ok(self.accounts.lock().await.keys().cloned().collect())
    }

    async fn flush(&self) -> PortResult<()> {
        let accounts = self.accounts.lock().await;
        self.write(&accounts).await
    }
}
