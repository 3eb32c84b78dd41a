//! Request batching
//!
//! [`RequestBatcher`] plans a possibly over-sized query into leaf queries
//! with [`BatchPlanner`] and issues every leaf through a [`LeafFetcher`],
//! returning the raw responses in plan order.
//!
//! Leaves are independent. With a concurrency above one, sibling leaves are
//! fetched concurrently; the session's rate limiter stays the only admission
//! gate and results are still assembled in plan order. The first failing
//! leaf aborts the whole retrieval, dropping whatever is still in flight.

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::debug;

pub mod planner;

pub use planner::{BatchPlanner, MAX_BATCHES, MAX_LAST_HOURS};

use crate::cancel::CancelToken;
use crate::error::ClientResult;
use crate::query::Query;
use crate::session::ApiResponse;

/// Issues one rendered leaf request
#[async_trait]
pub trait LeafFetcher: Send + Sync {
    /// Fetch `resource_path` (resource plus encoded query string)
    async fn fetch(&self, resource_path: &str) -> ClientResult<ApiResponse>;
}

/// Splits queries and fetches the resulting batches
#[derive(Debug, Clone)]
pub struct RequestBatcher {
    planner: BatchPlanner,
    concurrency: usize,
}

impl RequestBatcher {
    /// Create a batcher fetching up to `concurrency` leaves at once
    pub fn new(planner: BatchPlanner, concurrency: usize) -> Self {
        Self {
            planner,
            concurrency: concurrency.max(1),
        }
    }

    /// The planner used to split queries
    pub fn planner(&self) -> &BatchPlanner {
        &self.planner
    }

    /// Leaves in flight at once
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Plan `query` and fetch every leaf
    ///
    /// # Returns
    /// One response per leaf, in plan order
    ///
    /// # Errors
    /// Fails fast with the first leaf error, `ClientError::Cancelled` once
    /// `cancel` fires, or a planning error before any request is issued
    pub async fn fetch_all<F>(
        &self,
        fetcher: &F,
        query: Query,
        cancel: Option<&CancelToken>,
    ) -> ClientResult<Vec<ApiResponse>>
    where
        F: LeafFetcher + ?Sized,
    {
        let leaves = self.planner.plan(query)?;
        let total = leaves.len();
        debug!(batches = total, concurrency = self.concurrency, "Planned batches");

        stream::iter(leaves.into_iter().enumerate())
            .map(|(index, leaf)| async move {
                let path = leaf.to_resource_path();
                debug!(batch = index + 1, total, resource = %path, "Fetching batch");
                fetch_leaf(fetcher, &path, cancel).await
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

/// Fetch one leaf, racing it against the cancel token
pub(crate) async fn fetch_leaf<F>(
    fetcher: &F,
    path: &str,
    cancel: Option<&CancelToken>,
) -> ClientResult<ApiResponse>
where
    F: LeafFetcher + ?Sized,
{
    match cancel {
        Some(cancel) => cancel.run(fetcher.fetch(path)).await,
        None => fetcher.fetch(path).await,
    }
}
