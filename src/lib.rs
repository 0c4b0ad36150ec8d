//! etcdv2 - An async client for the etcd v2 keys API.
//!
//! The client speaks the HTTP/JSON protocol of the `/v2/keys` endpoint and
//! exposes each operation as a future resolving to a typed response.
//!
//! # Architecture
//!
//! The crate uses:
//! - reqwest for HTTP, with one pooled client for ordinary requests and one
//!   without timeout for long-poll watches
//! - tokio-retry for exponential backoff and endpoint failover
//! - Tokio for the async runtime and for blocking waits with a deadline
//!
//! # Example
//!
//! ```no_run
//! use etcdv2::EtcdClient;
//! use etcdv2::utils::wait::{DEFAULT_AWAIT_TIMEOUT, await_result};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     etcdv2::setup_logging();
//!
//!     let client = EtcdClient::connect("http://localhost:4001")?;
//!     let response = await_result(client.get("test4"), DEFAULT_AWAIT_TIMEOUT)?;
//!     println!("{response:?}");
//!
//!     Ok(())
//! }
//! ```
// Module declarations
pub mod clients;
pub mod core;
pub mod errors;
pub mod utils;

pub use clients::{EtcdClient, KeyValueStore};
pub use crate::core::config::ClientConfig;
pub use crate::core::models::{Action, ClusterIndex, EtcdResponse, Node};
pub use errors::{ApiError, ErrorCode, EtcdError};

/// Configure structured logging with JSON format.
///
/// The level comes from `RUST_LOG` and defaults to `info`. Calling this more
/// than once keeps the first subscriber.
///
/// # Example
///
/// ```
/// etcdv2::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
