//! In-process store, for tests and single-process deployments that don't need durability.

use super::{CredentialRecord, Document, SnapshotStore, TokenStore};
use crate::error::StorageError;
use crate::youtube_api::{AnalyticsDay, ChannelInfo, VideoInfo};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: RwLock<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        self.doc.write().await.save_credential(record);
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>, StorageError> {
        Ok(self.doc.read().await.credential(user_id))
    }

    async fn delete(&self, user_id: &str) -> Result<(), StorageError> {
        self.doc.write().await.delete_credential(user_id);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert_channel(
        &self,
        user_id: &str,
        channel: &ChannelInfo,
    ) -> Result<(), StorageError> {
        self.doc.write().await.upsert_channel(user_id, channel);
        Ok(())
    }

    async fn upsert_videos(&self, user_id: &str, videos: &[VideoInfo]) -> Result<(), StorageError> {
        self.doc.write().await.upsert_videos(user_id, videos);
        Ok(())
    }

    async fn upsert_analytics(
        &self,
        user_id: &str,
        channel_id: &str,
        days: &[AnalyticsDay],
    ) -> Result<(), StorageError> {
        self.doc
            .write()
            .await
            .upsert_analytics(user_id, channel_id, days);
        Ok(())
    }

    async fn channels(&self, user_id: &str) -> Result<Vec<ChannelInfo>, StorageError> {
        Ok(self.doc.read().await.channels(user_id))
    }

    async fn videos(&self, user_id: &str) -> Result<Vec<VideoInfo>, StorageError> {
        Ok(self.doc.read().await.videos(user_id))
    }

    async fn analytics(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Vec<AnalyticsDay>, StorageError> {
        Ok(self.doc.read().await.analytics(user_id, channel_id))
    }
}
