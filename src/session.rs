// src/session.rs
//
// =============================================================================
// LABLOG: SESSION FLAG STORE (v 0.1 )
// =============================================================================
//
// Local key-value storage for the "logged in" flag.
//
// This is deliberately separate from the primary store: it belongs to the
// device, not to the lab. There is no credential check, only presence.

use crate::error::ValidationError;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const KEY_LOGGED_IN: &str = "isLoggedIn";
const KEY_USERNAME: &str = "username";

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.path).context("Failed to open session store")
    }

    fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let val = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(val)
    }

    /// Both fields must be non-blank. Flag and name are written together.
    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::set(&tx, KEY_LOGGED_IN, "true")?;
        Self::set(&tx, KEY_USERNAME, username)?;
        tx.commit()?;

        log::info!("Logged in as {}", username);
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM meta WHERE key IN (?1, ?2)",
            params![KEY_LOGGED_IN, KEY_USERNAME],
        )?;
        log::info!("Logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> Result<bool> {
        Ok(self.read(KEY_LOGGED_IN)?.as_deref() == Some("true"))
    }

    pub fn username(&self) -> Result<Option<String>> {
        self.read(KEY_USERNAME)
    }
}
