//! YouTube Data API v3 and Analytics API v2 client library.
//!
//! The dashboard reads three kinds of resources:
//!
//! - the authenticated user's own channel (`channels.list` with `mine=true`),
//! - the videos of a channel, listed through `search.list` and then detailed through
//!   `videos.list`, since search results carry nothing but ids,
//! - per-day channel metrics from the Analytics API's `reports.query`.
//!
//! [`YouTubeClient`] exposes these as typed operations. Underneath, [`ApiGateway`] attaches the
//! API key and the user's bearer token to each request and handles the one-shot retry after a
//! rejected token.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tokio_stream::StreamExt;
//! use youtube_dashboard::youtube_api::YouTubeClient;
//!
//! # async fn example(client: YouTubeClient) -> youtube_dashboard::Result<()> {
//! if let Some(channel) = client.get_channel_info().await? {
//!     let mut videos = std::pin::pin!(client.channel_videos(channel.id.clone()));
//!     while let Some(video) = videos.next().await {
//!         let video = video?;
//!         println!("{}: {} views", video.title, video.view_count);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod channels;
pub mod client;
pub mod gateway;
pub mod types;
pub mod videos;

pub use client::{MAX_PAGE_SIZE, YouTubeClient};
pub use gateway::ApiGateway;
pub use types::{PageInfo, PagedStream, Thumbnails};

pub use analytics::{AnalyticsDay, AnalyticsReport, DateRange, Metric};
pub use channels::ChannelInfo;
pub use videos::{VideoInfo, VideoPage};
