use std::{
    collections::HashMap,
    fs::{self, File},
    future::Future,
    io::Write,
    path::PathBuf,
};

use anyhow::Context;

use crate::error::AppResult;

/// Persistent mapping from CRM contact/lead identifier to AI conversation
/// identifier. Bindings are created lazily on first use and never
/// overwritten, so every follow-up message from a contact continues the same
/// conversation context.
///
/// Reads and writes the whole mapping each time; volume is low and there is a
/// single writer by construction.
pub struct ConversationBindingStore {
    path: PathBuf,
}

impl ConversationBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the conversation bound to `contact_id`, minting one through
    /// `create` and persisting the binding when none exists yet. A failed
    /// `create` persists nothing.
    pub async fn get_or_create<F, Fut>(&self, contact_id: &str, create: F) -> AppResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<String>>,
    {
        let mut mapping = self.load();

        if let Some(existing) = mapping.get(contact_id) {
            return Ok(existing.clone());
        }

        let conversation_id = create().await?;
        mapping.insert(contact_id.to_string(), conversation_id.clone());
        self.save(&mapping)?;

        Ok(conversation_id)
    }

    fn load(&self) -> HashMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };

        match serde_json::from_str(&raw) {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::warn!(
                    "Conversation mapping {} is unreadable, treating as empty: {}",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    fn save(&self, mapping: &HashMap<String, String>) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(mapping)?;

        let mut file = File::create(&self.path).with_context(|| {
            format!(
                "Could not create conversation mapping file {}",
                self.path.display()
            )
        })?;
        file.write_all(raw.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }
}
