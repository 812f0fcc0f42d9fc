//! Local sign-in state and display preferences.
//!
//! There is no real authentication: any non-blank username/password pair is
//! accepted. State lives in the same key-value store as the favorites.

use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

const AUTH_KEY: &str = "isAuthenticated";
const USERNAME_KEY: &str = "username";
const LOGGED_IN_AT_KEY: &str = "loggedInAt";
const DARK_MODE_KEY: &str = "darkMode";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub username: Option<String>,
    pub logged_in_at: Option<DateTime<Utc>>,
    pub dark_mode: bool,
}

pub struct Session {
    storage: Arc<dyn KeyValueStore>,
    /// Held across every read-modify-write of session keys.
    writes: Mutex<()>,
}

impl Session {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            writes: Mutex::new(()),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blank checks ignore surrounding whitespace; the username is stored as typed.
    pub fn login(&self, username: &str, password: &str) -> Result<SessionInfo> {
        if username.trim().is_empty() || password.trim().is_empty() {
            anyhow::bail!("Username and password are required");
        }
        let _guard = self.write_lock();
        self.storage
            .set(AUTH_KEY, b"true")
            .context("Failed to store session")?;
        self.storage
            .set(USERNAME_KEY, username.as_bytes())
            .context("Failed to store username")?;
        let now = Utc::now().to_rfc3339();
        if let Err(e) = self.storage.set(LOGGED_IN_AT_KEY, now.as_bytes()) {
            warn!("Failed to store login time: {}", e);
        }
        info!("User '{}' signed in", username);
        Ok(self.info())
    }

    pub fn logout(&self) -> Result<()> {
        let _guard = self.write_lock();
        for key in [AUTH_KEY, USERNAME_KEY, LOGGED_IN_AT_KEY] {
            self.storage
                .remove(key)
                .with_context(|| format!("Failed to clear '{}'", key))?;
        }
        info!("User signed out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_text(AUTH_KEY).as_deref() == Some("true")
    }

    pub fn username(&self) -> Option<String> {
        if !self.is_authenticated() {
            return None;
        }
        self.read_text(USERNAME_KEY)
    }

    pub fn dark_mode(&self) -> bool {
        self.read_text(DARK_MODE_KEY)
            .and_then(|v| serde_json::from_str::<bool>(&v).ok())
            .unwrap_or(false)
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<bool> {
        let _guard = self.write_lock();
        self.store_dark_mode(enabled)
    }

    pub fn toggle_dark_mode(&self) -> Result<bool> {
        let _guard = self.write_lock();
        self.store_dark_mode(!self.dark_mode())
    }

    fn store_dark_mode(&self, enabled: bool) -> Result<bool> {
        let encoded = serde_json::to_vec(&enabled)?;
        self.storage
            .set(DARK_MODE_KEY, &encoded)
            .context("Failed to store theme preference")?;
        Ok(enabled)
    }

    pub fn info(&self) -> SessionInfo {
        let authenticated = self.is_authenticated();
        let logged_in_at = if authenticated {
            self.read_text(LOGGED_IN_AT_KEY)
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|d| d.with_timezone(&Utc))
        } else {
            None
        };
        SessionInfo {
            authenticated,
            username: self.username(),
            logged_in_at,
            dark_mode: self.dark_mode(),
        }
    }

    fn read_text(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(v) => v.and_then(|bytes| String::from_utf8(bytes).ok()),
            Err(e) => {
                warn!("Failed to read '{}' from storage: {}", key, e);
                None
            }
        }
    }
}
