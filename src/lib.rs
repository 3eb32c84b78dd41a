//! # Telemetry Client Library
//!
//! A client for rate-limited, paginated HTTP telemetry APIs. It manages an
//! authenticated session, throttles outgoing requests to stay under the
//! server's rate limit and transparently splits queries that would exceed
//! the server's row/column limits into several smaller requests.
//!
//! ## Features
//!
//! - **Scoped sessions**: login on entry, logout on every exit path
//! - **Rate Limiting**: sliding one-second window shared by all requests
//! - **Request Batching**: recursive splitting by measures, explicit ranges,
//!   relative windows and change cursors
//! - **Cancellation**: cancel tokens and deadlines abort pending batches
//!
//! ## Quick Start
//!
//! ```no_run
//! use telemetry_client::{ClientConfig, Credentials, Query, ResourceClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://example.com/dms-api")
//!     .with_credentials(Credentials::from_pairs([
//!         ("username", "alice"),
//!         ("password", "secret"),
//!     ]));
//! let client = ResourceClient::new(&config)?;
//!
//! let (data, sites) = client
//!     .scoped(async {
//!         let data = client
//!             .retrieve(Query::new("restricted/v1/data").last_hours(168.0))
//!             .await?;
//!         let sites = client.retrieve(Query::new("restricted/v1/sites")).await?;
//!         Ok((data, sites))
//!     })
//!     .await?;
//!
//! println!("{} data batches, {} site responses", data.len(), sites.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`session`] - Session lifecycle, throttled transport and raw responses
//! - [`query`] - Query values, time-specification validation and encoding
//! - [`batch`] - Splitting of over-sized queries and batch execution
//! - [`client`] - Routing between batched and direct retrieval
//! - [`config`] - Client configuration and server limits
//!
//! Responses are returned unmerged, one per batch; combining them into a
//! dataset is left to the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Request splitting and batch execution
pub mod batch;

/// Cancellation of in-progress retrievals
pub mod cancel;

/// Public resource client
pub mod client;

/// Client configuration
pub mod config;

/// Error types
pub mod error;

/// Tracing subscriber setup
pub mod logging;

/// Metrics emitted by the client
pub mod metrics;

/// Query values and encoding
pub mod query;

/// Authenticated, throttled session
pub mod session;

// Re-export commonly used types
pub use batch::{BatchPlanner, LeafFetcher, RequestBatcher};
pub use cancel::{CancelOnDrop, CancelToken};
pub use client::ResourceClient;
pub use config::{ClientConfig, Credentials, Limits};
pub use error::{ClientError, ClientResult};
pub use query::{Query, TimeSpec};
pub use session::{ApiResponse, RateLimiter, SessionDialog, SessionPhase};
