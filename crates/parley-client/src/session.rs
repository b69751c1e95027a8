//! Session persistence.
//!
//! A single JSON file holding the serialized current-user record is the
//! only client-side persisted state; everything else is rebuilt from the
//! backend on start.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use parley_shared::constants::SESSION_FILE;
use parley_shared::types::UserId;

use crate::error::{ClientError, Result};

/// The signed-in user as handed over by the auth collaborator.  The core
/// trusts the id as given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Reads and writes the session record.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Use the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/parley/session.json`
    /// - macOS:   `~/Library/Application Support/com.parley.parley/session.json`
    /// - Windows: `{FOLDERID_RoamingAppData}\parley\parley\data\session.json`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "parley", "parley").ok_or(ClientError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(Self {
            path: data_dir.join(SESSION_FILE),
        })
    }

    /// Use an explicit file path.  Useful for tests and custom layouts.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the persisted user, if any.
    ///
    /// A record that fails to parse or carries a nil id is from an old or
    /// corrupted install; it is cleared rather than surfaced.
    pub fn restore(&self) -> Option<CurrentUser> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<CurrentUser>(&raw) {
            Ok(user) if !user.id.0.is_nil() => {
                info!(user = %user.id.short(), "session restored");
                Some(user)
            }
            Ok(_) | Err(_) => {
                warn!("stored session is malformed, clearing it");
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, user: &CurrentUser) -> Result<()> {
        let json = serde_json::to_string_pretty(user)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn clear(&self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
