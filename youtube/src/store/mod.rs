//! Persistence for OAuth credentials and the denormalized YouTube snapshots.
//!
//! Two stores live here:
//!
//! - [`TokenStore`] holds at most one [`CredentialRecord`] per user. Only
//!   [`crate::credentials::CredentialResolver`] writes to it.
//! - [`SnapshotStore`] caches what was last fetched from YouTube. Every write is an upsert keyed by
//!   the record's natural identity, so re-syncing the same channel, video, or analytics day never
//!   produces duplicates and never touches other records.
//!
//! Both traits are implemented by [`MemoryStore`] and [`JsonFileStore`].

use crate::error::StorageError;
use crate::oauth::TokenSet;
use crate::youtube_api::{AnalyticsDay, ChannelInfo, VideoInfo};
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use oauth2::{AccessToken, RefreshToken};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// The single live OAuth credential of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: String,
    pub access_token: AccessToken,
    /// Absent if the provider never issued one for this grant.
    pub refresh_token: Option<RefreshToken>,
    /// Computed once, when the record is issued. Never re-derived.
    pub expires_at: Timestamp,
    pub scope: String,
    pub token_type: String,
}

impl CredentialRecord {
    /// Builds the record for `tokens` as issued at `issued_at`.
    pub fn issue(user_id: &str, tokens: TokenSet, issued_at: Timestamp) -> Self {
        let lifetime = SignedDuration::try_from(tokens.expires_in).unwrap_or(SignedDuration::MAX);
        Self {
            user_id: user_id.to_string(),
            expires_at: issued_at.checked_add(lifetime).unwrap_or(Timestamp::MAX),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope,
            token_type: tokens.token_type,
        }
    }

    /// Whether the access token may still be used at `now`.
    pub fn is_fresh_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Stores `record` as the user's only credential, replacing any previous one.
    async fn save(&self, record: &CredentialRecord) -> Result<(), StorageError>;

    /// Returns `Ok(None)` if the user has no credential.
    async fn load(&self, user_id: &str) -> Result<Option<CredentialRecord>, StorageError>;

    /// Removes the user's credential. Removing a missing credential is not an error.
    async fn delete(&self, user_id: &str) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upserts keyed by (user, channel id).
    async fn upsert_channel(&self, user_id: &str, channel: &ChannelInfo)
    -> Result<(), StorageError>;

    /// Upserts keyed by (user, video id).
    async fn upsert_videos(&self, user_id: &str, videos: &[VideoInfo]) -> Result<(), StorageError>;

    /// Upserts keyed by (user, channel id, date).
    async fn upsert_analytics(
        &self,
        user_id: &str,
        channel_id: &str,
        days: &[AnalyticsDay],
    ) -> Result<(), StorageError>;

    async fn channels(&self, user_id: &str) -> Result<Vec<ChannelInfo>, StorageError>;

    async fn videos(&self, user_id: &str) -> Result<Vec<VideoInfo>, StorageError>;

    /// Days in chronological order.
    async fn analytics(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Vec<AnalyticsDay>, StorageError>;
}

/// Everything a store holds, shared by the in-memory and the file-backed implementation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default)]
    credentials: BTreeMap<String, CredentialRecord>,
    #[serde(default)]
    snapshots: BTreeMap<String, UserSnapshots>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserSnapshots {
    #[serde(default)]
    channels: BTreeMap<String, ChannelInfo>,
    #[serde(default)]
    videos: BTreeMap<String, VideoInfo>,
    /// channel id -> ISO date -> day
    #[serde(default)]
    analytics: BTreeMap<String, BTreeMap<String, AnalyticsDay>>,
}

impl Document {
    fn user(&mut self, user_id: &str) -> &mut UserSnapshots {
        self.snapshots.entry(user_id.to_string()).or_default()
    }

    pub(crate) fn save_credential(&mut self, record: &CredentialRecord) {
        self.credentials
            .insert(record.user_id.clone(), record.clone());
    }

    pub(crate) fn credential(&self, user_id: &str) -> Option<CredentialRecord> {
        self.credentials.get(user_id).cloned()
    }

    /// Returns whether a record was actually removed.
    pub(crate) fn delete_credential(&mut self, user_id: &str) -> bool {
        self.credentials.remove(user_id).is_some()
    }

    pub(crate) fn upsert_channel(&mut self, user_id: &str, channel: &ChannelInfo) {
        self.user(user_id)
            .channels
            .insert(channel.id.clone(), channel.clone());
    }

    pub(crate) fn upsert_videos(&mut self, user_id: &str, videos: &[VideoInfo]) {
        let user = self.user(user_id);
        for video in videos {
            user.videos.insert(video.id.clone(), video.clone());
        }
    }

    pub(crate) fn upsert_analytics(&mut self, user_id: &str, channel_id: &str, days: &[AnalyticsDay]) {
        let by_date = self
            .user(user_id)
            .analytics
            .entry(channel_id.to_string())
            .or_default();
        for day in days {
            by_date.insert(day.date.to_string(), day.clone());
        }
    }

    pub(crate) fn channels(&self, user_id: &str) -> Vec<ChannelInfo> {
        self.snapshots
            .get(user_id)
            .map(|u| u.channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn videos(&self, user_id: &str) -> Vec<VideoInfo> {
        self.snapshots
            .get(user_id)
            .map(|u| u.videos.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn analytics(&self, user_id: &str, channel_id: &str) -> Vec<AnalyticsDay> {
        self.snapshots
            .get(user_id)
            .and_then(|u| u.analytics.get(channel_id))
            .map(|days| days.values().cloned().collect())
            .unwrap_or_default()
    }
}
