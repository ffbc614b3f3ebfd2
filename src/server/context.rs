use crate::config::Limits;
use crate::storage::directory::LocalFileDirectory;
use crate::storage::shard::ShardRegistry;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// State shared by every connection task of one server.
pub struct ServerContext {
    pub files: LocalFileDirectory,
    pub shards: ShardRegistry,
    limits: Limits,
    shutdown: watch::Sender<bool>,
}

impl ServerContext {
    /// Opens (and scans) the storage directory and builds an empty shard registry.
    pub async fn open(storage_dir: impl Into<PathBuf>, limits: Limits) -> Result<Arc<Self>> {
        let files = LocalFileDirectory::open(storage_dir).await?;
        Ok(Self::new(files, limits))
    }

    pub fn new(files: LocalFileDirectory, limits: Limits) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            files,
            shards: ShardRegistry::new(),
            limits,
            shutdown,
        })
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Asks the accept loop to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
