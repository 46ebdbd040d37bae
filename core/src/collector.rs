use async_trait::async_trait;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

/// Paging parameters for one collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRequest {
    /// Items requested per call. Spotify caps this at 50.
    pub page_size: u32,
    /// Soft cap on the number of items to accumulate.
    pub target_count: u32,
    /// Pause between two consecutive page fetches.
    pub delay: Duration,
}

impl CollectionRequest {
    pub fn new(page_size: u32, target_count: u32, delay: Duration) -> Self {
        Self {
            page_size,
            target_count,
            delay,
        }
    }
}

/// One page as returned by a fetch binding.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    /// Size of the whole remote set, when the provider reports it.
    pub total: Option<u32>,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, has_next: bool) -> Self {
        Self {
            items,
            has_next,
            total: None,
        }
    }

    pub fn with_total(mut self, total: u32) -> Self {
        self.total = Some(total);
        self
    }
}

/// Pacing between page fetches.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Pages through a remote result set until it is exhausted or `target_count`
/// items have been gathered.
///
/// `fetch_page` receives `(offset, limit)` and performs exactly one remote call.
/// Its error is returned as-is and whatever was accumulated so far is dropped.
/// Items are kept in page order without de-duplication, so the result may
/// overshoot `target_count` by up to `page_size - 1`.
///
/// The delay runs only between two fetches: `n` fetched pages cause `n - 1` waits.
pub async fn collect<T, E, F, Fut>(
    request: &CollectionRequest,
    delay: &dyn Delay,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<PageResult<T>, E>>,
{
    let page_size = request.page_size.max(1);
    let mut accumulated = Vec::new();
    let mut offset: u32 = 0;
    let mut fetched: u32 = 0;

    while fetched < request.target_count {
        let page = fetch_page(offset, page_size).await?;
        let received = page.items.len() as u32;
        debug!(
            "Fetched page at offset {} ({} items, has_next: {})",
            offset, received, page.has_next
        );
        accumulated.extend(page.items);

        if !page.has_next {
            break;
        }
        if received == 0 {
            warn!(
                "Empty page at offset {} still reports a next page; stopping",
                offset
            );
            break;
        }

        fetched = fetched.saturating_add(received);
        offset = offset.saturating_add(page_size);

        if fetched >= request.target_count {
            break;
        }
        if page.total.is_some_and(|total| offset >= total) {
            debug!("Offset {} reached the reported total; stopping", offset);
            break;
        }

        delay.wait(request.delay).await;
    }

    Ok(accumulated)
}
