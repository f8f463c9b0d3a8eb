//! Application-level wiring: connect, disconnect, and sync a user's YouTube data.
//!
//! [`Dashboard`] owns one [`CredentialResolver`] and one HTTP connection pool, and builds a
//! per-user [`YouTubeClient`] on demand. The `sync_*` operations fetch fresh data and upsert it
//! into the [`SnapshotStore`].

use crate::config::{self, Config};
use crate::credentials::{Clock, CredentialResolver, SystemClock};
use crate::oauth::OAuthClient;
use crate::oauth::redirect::CallbackParams;
use crate::store::{SnapshotStore, TokenStore};
use crate::youtube_api::{
    AnalyticsReport, ApiGateway, ChannelInfo, DateRange, Metric, VideoPage, YouTubeClient, gateway,
};
use crate::{Error, Result};
use oauth2::CsrfToken;
use oauth2::url::Url;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Days of analytics fetched when no range is given.
pub const DEFAULT_ANALYTICS_DAYS: i64 = 30;

pub struct Dashboard {
    config: Config,
    http: reqwest::Client,
    resolver: Arc<CredentialResolver>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dashboard")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl Dashboard {
    pub fn new(
        config: Config,
        tokens: Arc<dyn TokenStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        Self::with_clock(config, tokens, snapshots, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: Config,
        tokens: Arc<dyn TokenStore>,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let http = config::http_client(config.api.request_timeout)?;
        let oauth = OAuthClient::with_http_client(config.oauth.clone(), http.clone());
        Ok(Self {
            config,
            http,
            resolver: Arc::new(CredentialResolver::with_clock(oauth, tokens, clock)),
            snapshots,
        })
    }

    pub fn resolver(&self) -> &Arc<CredentialResolver> {
        &self.resolver
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    /// The consent URL to send the user to. `state` must be remembered for the callback.
    pub fn authorization_url(&self, state: &CsrfToken) -> Result<Url> {
        self.resolver.oauth().authorization_url(state)
    }

    /// Handles the provider's redirect back to us.
    ///
    /// Verifies the callback against `expected_state`, exchanges the code, and stores the tokens.
    /// Then fetches the user's channel and caches it; failing to do so only gets logged, since
    /// the account is connected either way. Returns the channel, if one could be fetched.
    #[instrument(skip(self, params, expected_state))]
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        params: &CallbackParams,
        expected_state: &str,
    ) -> Result<Option<ChannelInfo>> {
        let code = params.authorization_code(expected_state)?;
        self.resolver.connect(user_id, &code).await?;
        tracing::info!("YouTube account connected");

        let channel = match self.client(user_id).get_channel_info().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch channel after connecting");
                return Ok(None);
            }
        };
        if let Some(channel) = &channel {
            if let Err(e) = self.snapshots.upsert_channel(user_id, channel).await {
                tracing::warn!(error = %e, "could not cache channel after connecting");
            }
        }
        Ok(channel)
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: &str) -> Result<()> {
        self.resolver.disconnect(user_id).await?;
        tracing::info!("YouTube account disconnected");
        Ok(())
    }

    /// Verifies the application API key against the Data API, independent of any user.
    ///
    /// Returns the number of results the test search found.
    pub async fn check_api_key(&self) -> Result<usize> {
        gateway::check_api_key(&self.http, &self.config.api).await
    }

    /// A client acting on behalf of `user_id`.
    pub fn client(&self, user_id: &str) -> YouTubeClient {
        let gateway = ApiGateway::new(
            self.http.clone(),
            self.config.api.api_key.clone(),
            Arc::clone(&self.resolver),
            user_id,
        );
        YouTubeClient::new(Arc::new(gateway), &self.config.api)
    }

    async fn connected_client(&self, user_id: &str) -> Result<YouTubeClient> {
        let client = self.client(user_id);
        if !client.has_valid_access().await? {
            return Err(Error::NotConnected);
        }
        Ok(client)
    }

    #[instrument(skip(self))]
    pub async fn sync_channel(&self, user_id: &str) -> Result<ChannelInfo> {
        let client = self.connected_client(user_id).await?;
        let channel = client.get_channel_info().await?.ok_or(Error::NoChannel)?;
        self.snapshots.upsert_channel(user_id, &channel).await?;
        Ok(channel)
    }

    #[instrument(skip(self))]
    pub async fn sync_videos(
        &self,
        user_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<VideoPage> {
        let client = self.connected_client(user_id).await?;
        let page = client.get_channel_videos(None, page_size, page_token).await?;
        self.snapshots.upsert_videos(user_id, &page.videos).await?;
        tracing::debug!(count = page.videos.len(), "synced videos");
        Ok(page)
    }

    /// Syncs analytics of the user's own channel. `range` defaults to the last
    /// [`DEFAULT_ANALYTICS_DAYS`] days and `metrics` to [`Metric::DEFAULT`].
    #[instrument(skip(self))]
    pub async fn sync_analytics(
        &self,
        user_id: &str,
        range: Option<DateRange>,
        metrics: &[Metric],
    ) -> Result<AnalyticsReport> {
        let client = self.connected_client(user_id).await?;
        let channel = client.get_channel_info().await?.ok_or(Error::NoChannel)?;
        let range = range.unwrap_or_else(|| {
            let today = self
                .resolver
                .clock()
                .now()
                .to_zoned(jiff::tz::TimeZone::UTC)
                .date();
            DateRange::last_days(today, DEFAULT_ANALYTICS_DAYS)
        });

        let report = client.get_analytics_data(&channel.id, range, metrics).await?;
        if report.available {
            self.snapshots
                .upsert_analytics(user_id, &channel.id, &report.data)
                .await?;
        }
        Ok(report)
    }
}
