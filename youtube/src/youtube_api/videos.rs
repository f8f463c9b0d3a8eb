//! YouTube Videos and Search API types.

use crate::youtube_api::types::{PageInfo, Thumbnails, count};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Response structure for the `videos.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/list>
#[derive(Debug, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<Video>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
}

/// A `video` resource represents a YouTube video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Deserialize)]
pub struct Video {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub statistics: Option<VideoStatistics>,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

/// Statistics about the video.
///
/// Fields the owner has hidden (likes, comments) are absent and read as 0.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#statistics>
#[derive(Debug, Default, Deserialize)]
pub struct VideoStatistics {
    #[serde(rename = "viewCount", default, deserialize_with = "count")]
    pub view_count: u64,
    #[serde(rename = "likeCount", default, deserialize_with = "count")]
    pub like_count: u64,
    #[serde(rename = "commentCount", default, deserialize_with = "count")]
    pub comment_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoContentDetails {
    /// ISO 8601 duration, like `PT4M13S`.
    pub duration: Option<String>,
}

/// Response structure for the `search.list` API call.
///
/// Search results only identify resources; details have to be fetched separately through
/// `videos.list`.
///
/// See: <https://developers.google.com/youtube/v3/docs/search/list>
#[derive(Debug, Deserialize)]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: ResourceId,
}

#[derive(Debug, Deserialize)]
pub struct ResourceId {
    pub kind: Option<String>,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

/// A video of the user's channel, as shown on the dashboard and cached per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<Timestamp>,
    /// ISO 8601 duration, as reported by YouTube.
    pub duration: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

impl From<Video> for VideoInfo {
    fn from(video: Video) -> Self {
        let snippet = video.snippet.unwrap_or_default();
        let stats = video.statistics.unwrap_or_default();
        Self {
            id: video.id,
            thumbnail_url: snippet.thumbnails.preferred_url(),
            title: snippet.title,
            description: snippet.description,
            published_at: snippet.published_at,
            duration: video.content_details.and_then(|d| d.duration),
            view_count: stats.view_count,
            like_count: stats.like_count,
            comment_count: stats.comment_count,
        }
    }
}

/// One page of a channel's videos, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPage {
    pub videos: Vec<VideoInfo>,
    /// Cursor for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
    /// YouTube's (approximate) total across all pages.
    pub total_results: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_projection_tolerates_hidden_stats() {
        let video: Video = serde_json::from_value(serde_json::json!({
            "id": "vid1",
            "snippet": {
                "title": "Borrowck explained",
                "publishedAt": "2024-02-03T04:05:06Z",
                "thumbnails": { "medium": { "url": "https://i.ytimg.com/m.jpg" } }
            },
            "statistics": { "viewCount": "900" },
            "contentDetails": { "duration": "PT12M3S" }
        }))
        .unwrap();

        let info = VideoInfo::from(video);
        assert_eq!(info.title, "Borrowck explained");
        assert_eq!(info.view_count, 900);
        assert_eq!(info.like_count, 0);
        assert_eq!(info.duration.as_deref(), Some("PT12M3S"));
        assert_eq!(
            info.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/m.jpg")
        );
    }

    #[test]
    fn search_results_may_lack_video_ids() {
        let response: SearchListResponse = serde_json::from_value(serde_json::json!({
            "nextPageToken": "CAUQAA",
            "pageInfo": { "totalResults": 7, "resultsPerPage": 5 },
            "items": [
                { "id": { "kind": "youtube#video", "videoId": "v1" } },
                { "id": { "kind": "youtube#playlist" } }
            ]
        }))
        .unwrap();
        let ids: Vec<_> = response
            .items
            .iter()
            .filter_map(|r| r.id.video_id.as_deref())
            .collect();
        assert_eq!(ids, ["v1"]);
        assert_eq!(response.page_info.total_results, 7);
    }
}
