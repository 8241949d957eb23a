use std::{
    fs::{self, File},
    io::Write,
    path::PathBuf,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    last_id: Option<String>,
}

/// Persists the identifier of the most recently seen inbound message so poll
/// cycles do not reprocess it. A missing or unreadable file degrades to
/// "no checkpoint": every listed message is treated as new, which is the
/// accepted bootstrap and crash-recovery behavior.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };

        match serde_json::from_str::<CheckpointFile>(&raw) {
            Ok(checkpoint) => checkpoint.last_id,
            Err(e) => {
                tracing::warn!(
                    "Checkpoint file {} is unreadable, treating as empty: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Overwrites the checkpoint and syncs it to disk, so the value is
    /// durable before the next poll cycle starts.
    pub fn save(&self, id: &str) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&CheckpointFile {
            last_id: Some(id.to_string()),
        })?;

        let mut file = File::create(&self.path)
            .with_context(|| format!("Could not create checkpoint file {}", self.path.display()))?;
        file.write_all(raw.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }
}
