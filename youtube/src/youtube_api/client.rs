//! The dashboard's view of the YouTube Data and Analytics APIs.

use crate::config::ApiConfig;
use crate::youtube_api::{
    analytics::{AnalyticsDay, AnalyticsReport, DateRange, Metric, ReportResponse},
    channels::{ChannelInfo, ChannelListResponse},
    gateway::ApiGateway,
    types::PagedStream,
    videos::{SearchListResponse, VideoInfo, VideoListResponse, VideoPage},
};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::instrument;

/// Largest page the Data API serves for `search.list` and `videos.list`.
pub const MAX_PAGE_SIZE: u32 = 50;

const VIDEO_PARTS: &str = "snippet,statistics,contentDetails";

/// Client for the YouTube Data API v3 and Analytics API v2, scoped to one user.
///
/// All requests go through an [`ApiGateway`], so access tokens are refreshed transparently and a
/// rejected token is retried exactly once.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    gateway: Arc<ApiGateway>,
    data_api_url: String,
    analytics_api_url: String,
}

impl YouTubeClient {
    pub fn new(gateway: Arc<ApiGateway>, config: &ApiConfig) -> Self {
        Self {
            gateway,
            data_api_url: config.data_api_url.trim_end_matches('/').to_string(),
            analytics_api_url: config.analytics_api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    /// Whether the user currently has (or can silently obtain) a fresh access token.
    pub async fn has_valid_access(&self) -> Result<bool> {
        self.gateway
            .resolver()
            .has_valid_access(self.gateway.user_id())
            .await
    }

    /// Returns the authenticated user's own channel, or `None` if the account has no channel.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/youtube.readonly`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self), fields(user_id = %self.gateway.user_id()))]
    pub async fn get_channel_info(&self) -> Result<Option<ChannelInfo>> {
        let url = format!("{}/channels", self.data_api_url);
        let query = [("part", "snippet,statistics,brandingSettings"), ("mine", "true")];
        let mut response: ChannelListResponse = self.gateway.get(&url, &query).await?;
        let Some(channel) = response.items.pop_front() else {
            tracing::debug!("account has no YouTube channel");
            return Ok(None);
        };
        Ok(Some(channel.into()))
    }

    /// Returns one page of a channel's videos, newest first.
    ///
    /// Without a `channel_id`, lists the authenticated user's own channel. This is a two-stage
    /// fetch: `search.list` yields the ids on the page, then a single `videos.list` call fetches
    /// their details. Pass the returned `next_page_token` to get the following page; a page
    /// without one is the last.
    ///
    /// `page_size` is clamped to `1..=50`.
    ///
    /// # API Reference
    ///
    /// * <https://developers.google.com/youtube/v3/docs/search/list>
    /// * <https://developers.google.com/youtube/v3/docs/videos/list>
    #[instrument(skip(self), fields(user_id = %self.gateway.user_id()))]
    pub async fn get_channel_videos(
        &self,
        channel_id: Option<&str>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<VideoPage> {
        let own;
        let channel_id = match channel_id {
            Some(id) => id,
            None => {
                own = self.get_channel_info().await?.ok_or(Error::NoChannel)?;
                own.id.as_str()
            }
        };

        let page_size = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query = vec![
            ("part", "id"),
            ("channelId", channel_id),
            ("type", "video"),
            ("order", "date"),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let url = format!("{}/search", self.data_api_url);
        let search: SearchListResponse = self.gateway.get(&url, &query).await?;

        let mut seen = HashSet::new();
        let ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|r| r.id.video_id)
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let total_results = search.page_info.total_results;
        let next_page_token = search.next_page_token;

        if ids.is_empty() {
            return Ok(VideoPage {
                videos: Vec::new(),
                next_page_token,
                total_results,
            });
        }

        let joined = ids.join(",");
        let url = format!("{}/videos", self.data_api_url);
        let details: VideoListResponse = self
            .gateway
            .get(&url, &[("part", VIDEO_PARTS), ("id", joined.as_str())])
            .await?;
        let mut by_id: HashMap<String, VideoInfo> = details
            .items
            .into_iter()
            .map(|v| (v.id.clone(), VideoInfo::from(v)))
            .collect();

        // Keep search order; ids without details (deleted since indexing) are dropped.
        let videos: Vec<VideoInfo> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        if videos.len() < ids.len() {
            tracing::debug!(
                missing = ids.len() - videos.len(),
                "some searched videos had no details"
            );
        }
        Ok(VideoPage {
            videos,
            next_page_token,
            total_results,
        })
    }

    /// Returns a stream of all videos of `channel_id`, fetching pages as needed.
    ///
    /// Each video is yielded once, even when consecutive pages overlap.
    #[instrument(skip(self))]
    pub fn channel_videos(
        &self,
        channel_id: String,
    ) -> impl Stream<Item = Result<VideoInfo>> + use<'_> {
        PagedStream::new(move |page_token: Option<String>| {
            let channel_id = channel_id.clone();
            async move {
                let page = self
                    .get_channel_videos(Some(&channel_id), MAX_PAGE_SIZE, page_token.as_deref())
                    .await?;
                Ok((VecDeque::from(page.videos), page.next_page_token))
            }
        })
        .unique_by(video_id)
    }

    /// Returns details for a single video, or `None` if no such video exists.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/list>
    #[instrument(skip(self))]
    pub async fn get_video_details(&self, video_id: &str) -> Result<Option<VideoInfo>> {
        let url = format!("{}/videos", self.data_api_url);
        let response: VideoListResponse = self
            .gateway
            .get(&url, &[("part", VIDEO_PARTS), ("id", video_id)])
            .await?;
        Ok(response.items.into_iter().next().map(VideoInfo::from))
    }

    /// Returns per-day channel metrics for `range`, with [`Metric::DEFAULT`] if `metrics` is empty.
    ///
    /// A `403` from the analytics endpoint is a normal state (the channel has no analytics yet)
    /// and yields an [`AnalyticsReport::unavailable`] report rather than an error.
    ///
    /// # Required Scopes
    ///
    /// * `https://www.googleapis.com/auth/yt-analytics.readonly`
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/analytics/reference/reports/query>
    #[instrument(skip(self), fields(user_id = %self.gateway.user_id()))]
    pub async fn get_analytics_data(
        &self,
        channel_id: &str,
        range: DateRange,
        metrics: &[Metric],
    ) -> Result<AnalyticsReport> {
        let metrics = if metrics.is_empty() {
            &Metric::DEFAULT[..]
        } else {
            metrics
        };
        let ids = format!("channel=={channel_id}");
        let start = range.start.to_string();
        let end = range.end.to_string();
        let metrics = Metric::join(metrics);
        let query = [
            ("ids", ids.as_str()),
            ("startDate", start.as_str()),
            ("endDate", end.as_str()),
            ("metrics", metrics.as_str()),
            ("dimensions", "day"),
            ("sort", "day"),
        ];

        let url = format!("{}/reports", self.analytics_api_url);
        match self.gateway.get::<ReportResponse>(&url, &query).await {
            Ok(report) => Ok(AnalyticsReport {
                data: AnalyticsDay::from_report(&report),
                available: true,
            }),
            Err(Error::QuotaOrScope { body }) => {
                tracing::warn!(%body, "analytics not available for this channel");
                Ok(AnalyticsReport::unavailable())
            }
            Err(e) => Err(e),
        }
    }
}

fn video_id(video: &VideoInfo) -> &str {
    &video.id
}
