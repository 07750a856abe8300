//! List responses and page-following shared by the stream and broadcast endpoints.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

type PendingPage<'a, F, T> =
    Pin<Box<dyn Future<Output = eyre::Result<(F, Page<T>)>> + 'a + Send>>;

/// One page of results plus the token for the page after it, if any.
pub type Page<T> = (VecDeque<T>, Option<String>);

/// A stream over every item of a paginated `*.list` endpoint.
///
/// Items are yielded one by one; the next page is only requested once the
/// current one has been drained. The first error ends the stream.
pub struct PagedStream<'a, T, F> {
    current_items: VecDeque<T>,
    pending_request: Option<PendingPage<'a, F, T>>,
    is_done: bool,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    /// `fetcher` is called with `None` for the first page and with the
    /// previous response's `nextPageToken` after that.
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
    {
        let first_page = async move {
            let page = fetcher(None).await?;
            Ok((fetcher, page))
        };
        Self {
            pending_request: Some(Box::pin(first_page)),
            current_items: VecDeque::new(),
            is_done: false,
        }
    }
}

impl<'a, T: Unpin, F> Unpin for PagedStream<'a, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            if self.is_done {
                return Poll::Ready(None);
            }

            let Some(pending) = self.pending_request.as_mut() else {
                self.is_done = true;
                return Poll::Ready(None);
            };
            match pending.as_mut().poll(cx) {
                Poll::Ready(Ok((fetcher, (items, next_token)))) => {
                    self.current_items.extend(items);
                    match next_token {
                        // YouTube sometimes hands out an empty token on the last page.
                        Some(token) if !token.is_empty() => {
                            self.pending_request = Some(Box::pin(async move {
                                let page = fetcher(Some(token)).await?;
                                Ok((fetcher, page))
                            }));
                        }
                        _ => {
                            self.is_done = true;
                            self.pending_request = None;
                        }
                    }
                }
                Poll::Ready(Err(e)) => {
                    self.pending_request = None;
                    self.is_done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Response envelope of every YouTube `*.list` call.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    /// Identifies the API resource's type, e.g. `youtube#liveStreamListResponse`.
    #[serde(default)]
    pub kind: String,
    #[serde(default = "VecDeque::new")]
    pub items: VecDeque<T>,
    #[serde(default)]
    pub page_info: PageInfo,
    pub next_page_token: Option<String>,
}

impl<T> ListResponse<T> {
    pub fn into_page(self) -> Page<T> {
        (self.items, self.next_page_token)
    }
}

/// Paging details for lists of resources.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// The total number of results in the result set.
    pub total_results: u32,
    /// The number of results included in the API response.
    pub results_per_page: u32,
}
