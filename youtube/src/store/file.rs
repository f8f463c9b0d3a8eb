//! A store persisted as a single JSON document on disk.
//!
//! Every mutation is a read-modify-write of the whole document under an async mutex, and the new
//! document replaces the old one through a rename, so a crash mid-write leaves the previous
//! version intact.

use super::{CredentialRecord, Document, SnapshotStore, TokenStore};
use crate::error::StorageError;
use crate::youtube_api::{AnalyticsDay, ChannelInfo, VideoInfo};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// The file is created on first write; a missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Document, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Document::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, doc: &Document) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(doc)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn update<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Document) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.read().await?;
        if f(&mut doc) {
            self.write(&doc).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for JsonFileStore {
    async fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        self.update(|doc| {
            doc.save_credential(record);
            true
        })
        .await
    }

    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>, StorageError> {
        Ok(self.read().await?.credential(user_id))
    }

    async fn delete(&self, user_id: &str) -> Result<(), StorageError> {
        self.update(|doc| doc.delete_credential(user_id)).await
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn upsert_channel(
        &self,
        user_id: &str,
        channel: &ChannelInfo,
    ) -> Result<(), StorageError> {
        self.update(|doc| {
            doc.upsert_channel(user_id, channel);
            true
        })
        .await
    }

    async fn upsert_videos(&self, user_id: &str, videos: &[VideoInfo]) -> Result<(), StorageError> {
        if videos.is_empty() {
            return Ok(());
        }
        self.update(|doc| {
            doc.upsert_videos(user_id, videos);
            true
        })
        .await
    }

    async fn upsert_analytics(
        &self,
        user_id: &str,
        channel_id: &str,
        days: &[AnalyticsDay],
    ) -> Result<(), StorageError> {
        if days.is_empty() {
            return Ok(());
        }
        self.update(|doc| {
            doc.upsert_analytics(user_id, channel_id, days);
            true
        })
        .await
    }

    async fn channels(&self, user_id: &str) -> Result<Vec<ChannelInfo>, StorageError> {
        Ok(self.read().await?.channels(user_id))
    }

    async fn videos(&self, user_id: &str) -> Result<Vec<VideoInfo>, StorageError> {
        Ok(self.read().await?.videos(user_id))
    }

    async fn analytics(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Vec<AnalyticsDay>, StorageError> {
        Ok(self.read().await?.analytics(user_id, channel_id))
    }
}
