//! File-backed [`ConversationStore`].
//!
//! One pretty-printed JSON file per conversation, replaced atomically via a
//! temporary file and rename so a crash never leaves a truncated record.

use async_trait::async_trait;
use courier_core::session::{ConversationRecord, ConversationStore};
use courier_core::{CourierError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct FileConversationStore {
    base_dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(CourierError::invalid_params(format!("invalid conversation id: {id:?}")));
        }
        Ok(self.base_dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let path = self.record_path(id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let json = serde_json::to_vec_pretty(record)?;
        let tmp_path = self.base_dir.join(format!(".{}.json.tmp", record.id));
        let mut tmp_file = tokio::fs::File::create(&tmp_path).await?;
        tmp_file.write_all(&json).await?;
        tmp_file.sync_all().await?;
        drop(tmp_file);

        tokio::fs::rename(&tmp_path, &path).await?;
        tracing::debug!("Saved conversation {} ({} messages)", record.id, record.messages.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::session::MessageRole;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path());
        assert!(store.load("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path().join("conversations"));
        let mut record = ConversationRecord::new("c1", "/work");
        record.push(MessageRole::User, "hello");
        record.push(MessageRole::Assistant, "hi");

        store.save(&record).await.unwrap();
        let loaded = store.load("c1").await.unwrap().unwrap();

        assert_eq!(loaded, record);
        assert!(!temp_dir.path().join("conversations/.c1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(temp_dir.path());
        assert!(store.load("../etc/passwd").await.is_err());
    }
}
