use clap::{Parser, Subcommand};
use eyre::{Context, OptionExt};
use jiff::civil::Date;
use oauth2::CsrfToken;
use oauth2::url::Url;
use serde::Serialize;
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_dashboard::oauth::redirect;
use youtube_dashboard::youtube_api::{DateRange, MAX_PAGE_SIZE, Metric, VideoInfo};
use youtube_dashboard::{ApiConfig, Config, Dashboard, JsonFileStore, OAuthConfig};

/// Connect a YouTube account and pull its channel, video, and analytics data.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[arg(long, env = "YOUTUBE_CLIENT_ID")]
    client_id: String,

    #[arg(long, env = "YOUTUBE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Must be registered for the client, and point at this machine for `connect`.
    #[arg(
        long,
        env = "YOUTUBE_REDIRECT_URI",
        default_value = "http://localhost:3000/api/auth/youtube/callback"
    )]
    redirect_uri: String,

    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// JSON file holding credentials and cached data.
    #[arg(long, default_value = "youtube-dashboard.json")]
    store: PathBuf,

    /// Whose account to act on.
    #[arg(long, default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize access to a YouTube account through the browser.
    Connect,
    /// Forget the stored credentials.
    Disconnect,
    /// Show (and cache) the connected channel.
    Channel,
    /// List (and cache) the channel's videos, newest first.
    Videos {
        #[arg(long, default_value_t = 25)]
        page_size: u32,
        #[arg(long)]
        page_token: Option<String>,
        /// Follow page tokens until the last page.
        #[arg(long, conflicts_with = "page_token")]
        all: bool,
    },
    /// Show (and cache) per-day channel analytics.
    Analytics {
        /// Defaults to 30 days before `end`.
        #[arg(long)]
        start: Option<Date>,
        /// Defaults to today (UTC).
        #[arg(long)]
        end: Option<Date>,
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<Metric>,
    },
    /// Check that the API key is set and accepted by the Data API.
    CheckKey,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut api = ApiConfig::default();
    if let Some(key) = cli.api_key.clone() {
        api = api.with_api_key(key);
    }
    let config = Config {
        oauth: OAuthConfig::google(&cli.client_id, &cli.client_secret, &cli.redirect_uri),
        api,
    };
    let store = Arc::new(JsonFileStore::new(&cli.store));
    let dashboard = Dashboard::new(config, store.clone(), store).context("set up dashboard")?;
    let user = cli.user.as_str();

    match cli.command {
        Command::Connect => connect(&dashboard, user, &cli.redirect_uri).await?,
        Command::Disconnect => {
            dashboard.disconnect(user).await.context("disconnect")?;
            eprintln!("disconnected {user}");
        }
        Command::Channel => {
            let channel = dashboard.sync_channel(user).await.context("fetch channel")?;
            print_json(&channel)?;
        }
        Command::Videos {
            page_size,
            page_token,
            all,
        } => {
            if all {
                let videos = all_videos(&dashboard, user).await?;
                print_json(&videos)?;
            } else {
                let page = dashboard
                    .sync_videos(user, page_size, page_token.as_deref())
                    .await
                    .context("fetch videos")?;
                print_json(&page)?;
            }
        }
        Command::Analytics {
            start,
            end,
            metrics,
        } => {
            let range = match (start, end) {
                (None, None) => None,
                (start, end) => {
                    let end = end.unwrap_or_else(|| {
                        jiff::Timestamp::now()
                            .to_zoned(jiff::tz::TimeZone::UTC)
                            .date()
                    });
                    let start = start.unwrap_or_else(|| {
                        DateRange::last_days(end, youtube_dashboard::dashboard::DEFAULT_ANALYTICS_DAYS)
                            .start
                    });
                    eyre::ensure!(start <= end, "--start {start} is after --end {end}");
                    Some(DateRange::new(start, end))
                }
            };
            let report = dashboard
                .sync_analytics(user, range, &metrics)
                .await
                .context("fetch analytics")?;
            if !report.available {
                eprintln!("analytics are not available for this channel yet");
            }
            print_json(&report)?;
        }
        Command::CheckKey => match dashboard.check_api_key().await {
            Ok(found) => eprintln!("API key works ({found} test result(s))"),
            Err(e @ youtube_dashboard::Error::QuotaOrScope { .. }) => {
                return Err(e).context(
                    "API key may be invalid, or the YouTube Data API v3 is not enabled for it",
                );
            }
            Err(e) => return Err(e).context("check API key"),
        },
    }

    Ok(())
}

async fn connect(dashboard: &Dashboard, user: &str, redirect_uri: &str) -> eyre::Result<()> {
    let redirect_uri = Url::parse(redirect_uri).context("parse redirect URI")?;
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_eyre("redirect URI has no port")?;
    let (_, callback) = redirect::listen(SocketAddr::from(([127, 0, 0, 1], port)))
        .await
        .context("listen for OAuth callback")?;

    let state = CsrfToken::new_random();
    let auth_url = dashboard
        .authorization_url(&state)
        .context("build authorization URL")?;
    tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
    if let Err(e) = webbrowser::open(auth_url.as_str()) {
        tracing::warn!(error = %e, "could not open browser");
        eprintln!("open this URL to continue: {auth_url}");
    }

    let params = callback.await.context("await OAuth callback")?;
    let channel = dashboard
        .complete_authorization(user, &params, state.secret())
        .await
        .context("complete authorization")?;
    match channel {
        Some(channel) => eprintln!("connected {user} to {} ({})", channel.title, channel.id),
        None => eprintln!("connected {user}; the account has no YouTube channel"),
    }
    Ok(())
}

async fn all_videos(dashboard: &Dashboard, user: &str) -> eyre::Result<Vec<VideoInfo>> {
    let channel = dashboard.sync_channel(user).await.context("fetch channel")?;
    let client = dashboard.client(user);
    let mut stream = std::pin::pin!(client.channel_videos(channel.id));
    let mut videos = Vec::new();
    while let Some(video) = stream.next().await {
        videos.push(video.context("fetch videos")?);
        if videos.len() % (MAX_PAGE_SIZE as usize) == 0 {
            tracing::debug!(count = videos.len(), "still fetching videos");
        }
    }
    dashboard
        .snapshots()
        .upsert_videos(user, &videos)
        .await
        .context("cache videos")?;
    Ok(videos)
}

fn print_json(value: &impl Serialize) -> eyre::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
