//! Delivery of generated files to the user.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

/// A file offered to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub contents: String,
}

/// Where downloads end up
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Deliver a file, returning where it was placed
    async fn deliver(&self, download: &Download) -> Result<PathBuf>;
}

/// Writes downloads into a directory
pub struct DirectoryDownloadSink {
    dir: PathBuf,
}

impl DirectoryDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectoryDownloadSink {
    async fn deliver(&self, download: &Download) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create download directory: {}", self.dir.display()))?;

        let path = self.dir.join(&download.file_name);
        fs::write(&path, &download.contents)
            .await
            .with_context(|| format!("Failed to write download: {}", path.display()))?;

        Ok(path)
    }
}

/// Keeps downloads in memory (embedding and tests)
#[derive(Default)]
pub struct MemoryDownloadSink {
    downloads: Mutex<Vec<Download>>,
}

impl MemoryDownloadSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first
    pub fn downloads(&self) -> Vec<Download> {
        self.downloads
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DownloadSink for MemoryDownloadSink {
    async fn deliver(&self, download: &Download) -> Result<PathBuf> {
        self.downloads
            .lock()
            .map_err(|_| anyhow::anyhow!("Download store poisoned"))?
            .push(download.clone());
        Ok(PathBuf::from(&download.file_name))
    }
}
