//! Best-effort cache of the last submitted idea.
//!
//! Only used to prefill the idea on the next start; failures are logged
//! and otherwise ignored.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Persistence for the last submitted idea
pub trait IdeaStore: Send + Sync {
    /// Last saved idea, if any
    fn load(&self) -> Option<String>;

    /// Remember an idea
    fn save(&self, idea: &str);
}

/// Stores the idea in a single text file
pub struct FileIdeaStore {
    path: PathBuf,
}

impl FileIdeaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the client home directory (`<home>/last_idea.txt`)
    pub fn in_home(home: &Path) -> Self {
        Self::new(home.join("last_idea.txt"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdeaStore for FileIdeaStore {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let idea = content.trim();
                (!idea.is_empty()).then(|| idea.to_string())
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No cached idea");
                None
            }
        }
    }

    fn save(&self, idea: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Failed to create idea cache directory");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, idea) {
            warn!(path = %self.path.display(), error = %e, "Failed to cache idea");
        }
    }
}

/// Keeps the idea in memory only
#[derive(Default)]
pub struct MemoryIdeaStore {
    idea: Mutex<Option<String>>,
}

impl MemoryIdeaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdeaStore for MemoryIdeaStore {
    fn load(&self) -> Option<String> {
        self.idea.lock().ok().and_then(|idea| idea.clone())
    }

    fn save(&self, idea: &str) {
        if let Ok(mut slot) = self.idea.lock() {
            *slot = Some(idea.to_string());
        }
    }
}
