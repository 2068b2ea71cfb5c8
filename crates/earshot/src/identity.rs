//! Persistence for the local identity.
//!
//! The local identity is the only state Earshot keeps across restarts.
//! At startup the builder asks the store for it; if one is found the
//! coordinator adopts it and connects without further input.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use earshot_protocol::Identity;
use serde::{Deserialize, Serialize};

/// Loads and saves the local identity.
///
/// Futures are `Send` because the coordinator calls `save` from its own
/// Tokio task.
pub trait IdentityStore: Send + Sync + 'static {
    /// Returns the saved identity, or `None` if nothing was saved yet.
    fn load(&self) -> impl Future<Output = io::Result<Option<Identity>>> + Send;

    /// Saves `identity`, replacing any previous one.
    fn save(&self, identity: &Identity) -> impl Future<Output = io::Result<()>> + Send;
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    identity: Identity,
}

/// Keeps the identity in a small JSON file: `{"identity": "..."}`.
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

impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> io::Result<Option<Identity>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let stored: StoredIdentity = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(stored.identity))
    }

    async fn save(&self, identity: &Identity) -> io::Result<()> {
        let stored = StoredIdentity {
            identity: identity.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, json).await?;
        tracing::debug!(path = %self.path.display(), %identity, "identity saved");
        Ok(())
    }
}

/// Keeps the identity in memory only. The default store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identity: Mutex<Option<Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `identity`, as if saved by a previous run.
    pub fn with_identity(identity: impl Into<Identity>) -> Self {
        Self {
            identity: Mutex::new(Some(identity.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    async fn load(&self) -> io::Result<Option<Identity>> {
        let guard = self
            .identity
            .lock()
            .map_err(|_| io::Error::other("identity store poisoned"))?;
        Ok(guard.clone())
    }

    async fn save(&self, identity: &Identity) -> io::Result<()> {
        let mut guard = self
            .identity
            .lock()
            .map_err(|_| io::Error::other("identity store poisoned"))?;
        *guard = Some(identity.clone());
        Ok(())
    }
}
