//! Local File Directory
//!
//! The set of regular file names physically present in the storage root.
//! PUT and DELETE keep it in step with the disk; GET and LIST read it.

use anyhow::{Context, Result};
use dashmap::DashSet;
use std::io;
use std::path::{Path, PathBuf};

pub struct LocalFileDirectory {
    root: PathBuf,
    names: DashSet<String>,
}

impl LocalFileDirectory {
    /// Creates the storage root if needed and seeds the set from the regular files already in it.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create storage directory {}", root.display()))?;

        let directory = Self {
            root,
            names: DashSet::new(),
        };

        let mut entries = tokio::fs::read_dir(&directory.root)
            .await
            .with_context(|| format!("failed to scan {}", directory.root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("Skipping non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            // Follows symlinks, like stat().
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_file() => {
                    directory.names.insert(name);
                }
                Ok(_) => tracing::debug!("Skipping non-regular entry {}", name),
                Err(e) => tracing::warn!("Cannot stat {}: {}", name, e),
            }
        }

        tracing::info!(
            "Storage directory {} holds {} file(s)",
            directory.root.display(),
            directory.names.len()
        );

        Ok(directory)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Returns `true` if the name was not present before.
    pub fn add(&self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    /// Returns `true` if the name was present.
    pub fn remove(&self, name: &str) -> bool {
        self.names.remove(name).is_some()
    }

    /// Removes the file from disk and then from the set.
    ///
    /// A file that already vanished from disk still counts as deleted.
    pub async fn delete(&self, name: &str) -> io::Result<bool> {
        if !self.contains(name) {
            return Ok(false);
        }
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("{} was already missing from disk", name);
            }
            Err(e) => return Err(e),
        }
        Ok(self.remove(name))
    }

    /// Snapshot of every name, sorted so a single LIST is stable.
    pub fn list_all(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
