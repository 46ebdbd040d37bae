/*
    spotify-tastes | Collects a listener's Spotify profile and top lists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::models::ListeningSnapshot;
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored document is unreadable: {0}")]
    Document(#[from] serde_json::Error),
}

/// Result of a persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// A document for this identity already exists; the new one was not written.
    DuplicateIdentity,
    Failure(String),
}

impl SaveOutcome {
    /// Text shown to the end user.
    pub fn message(&self) -> String {
        match self {
            SaveOutcome::Saved => "User data saved successfully".to_string(),
            SaveOutcome::DuplicateIdentity => "data already saved".to_string(),
            SaveOutcome::Failure(reason) => {
                format!("Error saving user data: {}\npls contact developer", reason)
            }
        }
    }
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveOutcome::Saved => write!(f, "saved"),
            SaveOutcome::DuplicateIdentity => write!(f, "duplicate identity"),
            SaveOutcome::Failure(reason) => write!(f, "failure: {}", reason),
        }
    }
}

/// Write-once document store keyed by a normalized identity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save(&self, identity_key: &str, snapshot: &ListeningSnapshot) -> SaveOutcome;

    async fn load(&self, identity_key: &str) -> Result<Option<ListeningSnapshot>, StoreError>;
}

/// Derives the identity key from the profile email and saves the snapshot.
pub async fn persist_snapshot(store: &dyn ProfileStore, snapshot: &ListeningSnapshot) -> SaveOutcome {
    let outcome = match snapshot.identity_key() {
        Some(key) => store.save(&key, snapshot).await,
        None => SaveOutcome::Failure("profile has no email address".to_string()),
    };

    match &outcome {
        SaveOutcome::Saved => info!("User data saved successfully"),
        SaveOutcome::DuplicateIdentity => warn!("Duplicate email, user data already saved"),
        SaveOutcome::Failure(reason) => error!("Error saving user data: {}", reason),
    }
    outcome
}

/// Keeps documents in process memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn save(&self, identity_key: &str, snapshot: &ListeningSnapshot) -> SaveOutcome {
        let document = match serde_json::to_string(snapshot) {
            Ok(document) => document,
            Err(e) => return SaveOutcome::Failure(e.to_string()),
        };

        let mut documents = self.documents.lock().await;
        if documents.contains_key(identity_key) {
            return SaveOutcome::DuplicateIdentity;
        }
        documents.insert(identity_key.to_string(), document);
        SaveOutcome::Saved
    }

    async fn load(&self, identity_key: &str) -> Result<Option<ListeningSnapshot>, StoreError> {
        let documents = self.documents.lock().await;
        match documents.get(identity_key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }
}

/// SQLite-backed store; the email column is the primary key.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and ensures the schema.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to database at {}", url);
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY NOT NULL,
                document TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn save(&self, identity_key: &str, snapshot: &ListeningSnapshot) -> SaveOutcome {
        let document = match serde_json::to_string(snapshot) {
            Ok(document) => document,
            Err(e) => return SaveOutcome::Failure(e.to_string()),
        };

        let result = sqlx::query("INSERT INTO users (email, document, saved_at) VALUES (?, ?, ?)")
            .bind(identity_key)
            .bind(document)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => SaveOutcome::Saved,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                SaveOutcome::DuplicateIdentity
            }
            Err(e) => SaveOutcome::Failure(e.to_string()),
        }
    }

    async fn load(&self, identity_key: &str) -> Result<Option<ListeningSnapshot>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM users WHERE email = ?")
            .bind(identity_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((document,)) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }
}
