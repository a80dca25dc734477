//! Shared fetch cache for SiteKit sites.
//!
//! This crate provides:
//! - `QueryKey` - Request identity derived from parameters
//! - `QueryPolicy` - Freshness, eviction and retry settings
//! - `QueryClient` - Process-wide cache with per-key coalescing,
//!   stale-while-revalidate and classification-based retries
//! - `CacheSnapshot` - Development-time view of the cache contents
//!
//! # Example
//!
//! ```ignore
//! use sitekit_query::{QueryClient, QueryKey};
//! use sitekit_data::FetchError;
//!
//! let client = QueryClient::global();
//! let user = client
//!     .fetch_query(QueryKey::new("user").with(1), || async {
//!         api::get_user(1).await.map_err(|e| FetchError::Request(e.to_string()))
//!     })
//!     .await?;
//! ```

mod client;
mod entry;
mod error;
mod inspect;
mod key;
mod policy;

pub use client::*;
pub use entry::*;
pub use error::*;
pub use inspect::*;
pub use key::*;
pub use policy::*;
