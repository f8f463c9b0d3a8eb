//! Shared types and streaming infrastructure for the YouTube API client.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

/// One page of items plus the cursor of the page after it, if any.
pub type Page<T> = (VecDeque<T>, Option<String>);

type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = crate::Result<(F, Page<T>)>> + Send + 'a>>;

/// Walks a cursor-paginated list endpoint, yielding items one at a time.
///
/// `fetcher` is called with `None` for the first page and with each `nextPageToken` after that;
/// a page without a token is the last. The provider's pages are not a stable snapshot: an upload
/// between two requests shifts every later page by one, so the same item can show up at the end
/// of one page and the start of the next. With [`PagedStream::unique_by`] such repeats are
/// skipped.
///
/// The first error ends the stream.
pub struct PagedStream<'a, T, F> {
    buffered: VecDeque<T>,
    next_page: Option<PendingPage<'a, F, T>>,
    /// Identity of an item, for skipping repeats across pages.
    key: Option<fn(&T) -> &str>,
    yielded: HashSet<String>,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + 'a,
        Fut: Future<Output = crate::Result<Page<T>>> + Send + 'a,
    {
        Self {
            buffered: VecDeque::new(),
            next_page: Some(fetch(fetcher, None)),
            key: None,
            yielded: HashSet::new(),
        }
    }

    /// Yields each `key` at most once over the whole stream.
    pub fn unique_by(mut self, key: fn(&T) -> &str) -> Self {
        self.key = Some(key);
        self
    }
}

fn fetch<'a, T, F, Fut>(fetcher: F, page_token: Option<String>) -> PendingPage<'a, F, T>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = crate::Result<Page<T>>> + Send + 'a,
{
    Box::pin(async move {
        let page = fetcher(page_token).await?;
        Ok((fetcher, page))
    })
}

impl<T: Unpin, F> Unpin for PagedStream<'_, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = crate::Result<Page<T>>> + Send + 'a,
{
    type Item = crate::Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            while let Some(item) = this.buffered.pop_front() {
                if let Some(key) = this.key {
                    let key = key(&item);
                    if !this.yielded.insert(key.to_string()) {
                        tracing::debug!(key, "skipping item repeated from an earlier page");
                        continue;
                    }
                }
                return Poll::Ready(Some(Ok(item)));
            }

            let Some(pending) = this.next_page.as_mut() else {
                return Poll::Ready(None);
            };
            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    this.next_page = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetcher, (items, next_token)))) => {
                    this.buffered.extend(items);
                    this.next_page = next_token.map(|token| fetch(fetcher, Some(token)));
                }
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}

/// Thumbnail images of a channel or video, keyed by resolution.
///
/// See: <https://developers.google.com/youtube/v3/docs/thumbnails>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
    pub standard: Option<Thumbnail>,
    pub maxres: Option<Thumbnail>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Thumbnails {
    /// The URL the dashboard shows: `high`, else `medium`, else `default`.
    pub fn preferred_url(&self) -> Option<String> {
        [&self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .map(|t| t.url.clone())
            .next()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Number(u64),
    Text(String),
}

/// Deserializes the counters YouTube encodes as decimal strings (`"viewCount": "1234"`).
///
/// Missing, `null`, and unparsable values all read as 0. Use together with `#[serde(default)]`.
pub(crate) fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawCount>::deserialize(deserializer)? {
        Some(RawCount::Number(n)) => n,
        Some(RawCount::Text(s)) => s.parse().unwrap_or(0),
        None => 0,
    })
}
