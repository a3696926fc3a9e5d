//! Persistent per-install identity

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};

/// Source of the stable per-install identifier.
pub trait IdentityStore: Send + Sync {
    /// Return the stored identifier, generating and persisting one if absent.
    fn load_or_create(&self) -> Result<String>;
}

/// Identity kept in a small text file.
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileIdentityStore {
    /// `$XDG_DATA_HOME/trackline/identity`
    fn default() -> Self {
        Self::new(Config::identity_path())
    }
}

impl IdentityStore for FileIdentityStore {
    fn load_or_create(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                if !id.is_empty() {
                    return Ok(id.to_string());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Identity(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &id).map_err(|e| {
            Error::Identity(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = %self.path.display(), "Generated new install identity");
        Ok(id)
    }
}

/// Fixed identity supplied by the host.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

impl IdentityStore for StaticIdentity {
    fn load_or_create(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
