//! YouTube Channels API types.

use crate::youtube_api::types::{PageInfo, Thumbnails, count};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `channels.list` API call.
///
/// YouTube leaves out `items` entirely when the account has no channel.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels/list>
#[derive(Debug, Deserialize)]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: VecDeque<Channel>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `channel` resource contains information about a YouTube channel.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels#resource>
#[derive(Debug, Deserialize)]
pub struct Channel {
    /// The ID that YouTube uses to uniquely identify the channel.
    pub id: String,
    pub snippet: ChannelSnippet,
    pub statistics: Option<ChannelStatistics>,
    #[serde(rename = "brandingSettings")]
    pub branding_settings: Option<BrandingSettings>,
}

/// See: <https://developers.google.com/youtube/v3/docs/channels#snippet>
#[derive(Debug, Deserialize)]
pub struct ChannelSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "customUrl")]
    pub custom_url: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

/// See: <https://developers.google.com/youtube/v3/docs/channels#statistics>
#[derive(Debug, Default, Deserialize)]
pub struct ChannelStatistics {
    #[serde(rename = "viewCount", default, deserialize_with = "count")]
    pub view_count: u64,
    /// Rounded down to three significant figures by YouTube.
    #[serde(rename = "subscriberCount", default, deserialize_with = "count")]
    pub subscriber_count: u64,
    #[serde(rename = "hiddenSubscriberCount", default)]
    pub hidden_subscriber_count: bool,
    #[serde(rename = "videoCount", default, deserialize_with = "count")]
    pub video_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct BrandingSettings {
    pub channel: Option<ChannelBranding>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelBranding {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// The authenticated user's channel, as shown on the dashboard and cached per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub custom_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<Timestamp>,
    pub view_count: u64,
    pub subscriber_count: u64,
    pub hidden_subscriber_count: bool,
    pub video_count: u64,
}

impl From<Channel> for ChannelInfo {
    fn from(channel: Channel) -> Self {
        let stats = channel.statistics.unwrap_or_default();
        let branding = channel.branding_settings.and_then(|b| b.channel);
        // Prefer the snippet; the branding copy is only a fallback for an empty description.
        let description = match branding.and_then(|b| b.description) {
            Some(d) if channel.snippet.description.is_empty() => d,
            _ => channel.snippet.description,
        };
        Self {
            id: channel.id,
            thumbnail_url: channel.snippet.thumbnails.preferred_url(),
            title: channel.snippet.title,
            description,
            custom_url: channel.snippet.custom_url,
            published_at: channel.snippet.published_at,
            view_count: stats.view_count,
            subscriber_count: stats.subscriber_count,
            hidden_subscriber_count: stats.hidden_subscriber_count,
            video_count: stats.video_count,
        }
    }
}
