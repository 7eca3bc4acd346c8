// LogPulse - app/state_store.rs
//
// Durable scan state: one JSON document mapping site -> file -> offsets.
//
// - Loaded once when the coordinator is constructed.
// - Saved after every scan pass, reset, and reparse.
// - Saved atomically (write temp, rename to final) so a crash mid-write
//   leaves the previous document intact.
// - A missing file is a normal first run; a corrupt file is logged and
//   treated as empty, which makes the next pass rescan from offset 0.

use crate::core::model::ScanState;
use crate::util::constants::STATE_FILE_NAME;
use crate::util::error::StateError;
use std::path::{Path, PathBuf};

/// Location of the scan state document.
#[derive(Debug, Clone)]
pub struct ScanStateStore {
    path: PathBuf,
}

impl ScanStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default file name inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state; empty on any error.
    pub fn load(&self) -> ScanState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Cannot read scan state, starting from empty state"
                    );
                }
                return ScanState::default();
            }
        };

        match serde_json::from_str::<ScanState>(&content) {
            Ok(state) => {
                tracing::info!(path = %self.path.display(), "Scan state loaded");
                state
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Scan state is malformed, starting from empty state"
                );
                ScanState::default()
            }
        }
    }

    /// Write `state` atomically, creating parent directories as needed.
    pub fn save(&self, state: &ScanState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StateError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json =
            serde_json::to_string_pretty(state).map_err(|source| StateError::Serialise { source })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|source| StateError::Write {
            path: tmp.clone(),
            source,
        })?;

        std::fs::rename(&tmp, &self.path).map_err(|source| {
            // Ignore any secondary error.
            let _ = std::fs::remove_file(&tmp);
            StateError::Rename {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(path = %self.path.display(), "Scan state saved");
        Ok(())
    }
}
