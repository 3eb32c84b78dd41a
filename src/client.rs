//! Public resource client
//!
//! [`ResourceClient`] routes each query: the batched resource is validated
//! and split through the [`RequestBatcher`]; every other resource is one
//! direct authenticated request. Both paths return a list of raw responses.

use reqwest::Method;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

use crate::batch::{self, BatchPlanner, RequestBatcher};
use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics;
use crate::query::Query;
use crate::session::{ApiResponse, SessionDialog};

/// Client for the telemetry API resources
pub struct ResourceClient {
    session: Arc<SessionDialog>,
    batcher: RequestBatcher,
    batched_resource: String,
}

impl ResourceClient {
    /// Create a client with its own session
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the configuration is invalid
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let session = Arc::new(SessionDialog::new(config)?);
        Self::with_session(session, config)
    }

    /// Create a client on top of an existing session
    ///
    /// Relative windows are resolved against the session's "now".
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the limits or the sampling interval
    /// cannot be planned against
    pub fn with_session(session: Arc<SessionDialog>, config: &ClientConfig) -> ClientResult<Self> {
        let planner =
            BatchPlanner::new(config.limits, config.sampling_interval(), session.now())?;
        Ok(Self {
            batcher: RequestBatcher::new(planner, config.max_concurrent_batches),
            batched_resource: config.batched_resource.clone(),
            session,
        })
    }

    /// The underlying session
    pub fn session(&self) -> &Arc<SessionDialog> {
        &self.session
    }

    /// The batcher serving the batched resource
    pub fn batcher(&self) -> &RequestBatcher {
        &self.batcher
    }

    /// Run `body` inside an open session, closing it on every exit path
    pub async fn scoped<T, F>(&self, body: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.session.scoped(body).await
    }

    /// Retrieve a resource
    ///
    /// # Returns
    /// One raw response per batch; a single-element list for resources that
    /// are not batched
    ///
    /// # Errors
    /// - `ClientError::Validation` for an illegal time specification on the
    ///   batched resource, before any request is sent
    /// - any request or session error, aborting the retrieval
    pub async fn retrieve(&self, query: Query) -> ClientResult<Vec<ApiResponse>> {
        self.retrieve_inner(query, None).await
    }

    /// Retrieve a resource, aborting when `cancel` fires
    pub async fn retrieve_cancellable(
        &self,
        query: Query,
        cancel: &CancelToken,
    ) -> ClientResult<Vec<ApiResponse>> {
        self.retrieve_inner(query, Some(cancel)).await
    }

    /// Retrieve a resource, aborting at `deadline`
    ///
    /// # Errors
    /// Returns `ClientError::DeadlineExceeded` if the deadline passes first;
    /// in-flight and pending batches are dropped
    pub async fn retrieve_with_deadline(
        &self,
        query: Query,
        deadline: Instant,
    ) -> ClientResult<Vec<ApiResponse>> {
        tokio::time::timeout_at(deadline, self.retrieve_inner(query, None))
            .await
            .map_err(|_| ClientError::DeadlineExceeded)?
    }

    async fn retrieve_inner(
        &self,
        query: Query,
        cancel: Option<&CancelToken>,
    ) -> ClientResult<Vec<ApiResponse>> {
        let resource = query.resource().to_string();

        if resource == self.batched_resource {
            query.time_spec()?;

            let responses = self
                .batcher
                .fetch_all(self.session.as_ref(), query, cancel)
                .await?;

            metrics::record_batches(responses.len());
            if responses.len() > 1 {
                info!(
                    resource = %resource,
                    batches = responses.len(),
                    "Successfully retrieved {} in {} batches",
                    resource,
                    responses.len()
                );
            } else {
                info!(resource = %resource, "Successfully retrieved {}", resource);
            }
            return Ok(responses);
        }

        let path = query.to_resource_path();
        let response = match cancel {
            Some(cancel) => batch::fetch_leaf(self.session.as_ref(), &path, Some(cancel)).await?,
            None => self.session.request(Method::GET, &path).await?,
        };
        info!(resource = %resource, "Successfully retrieved {}", resource);
        Ok(vec![response])
    }
}
