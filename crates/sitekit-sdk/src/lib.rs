//! Public SDK for SiteKit sites.
//!
//! This crate re-exports all SiteKit functionality:
//!
//! ```ignore
//! use sitekit_sdk::prelude::*;
//!
//! let site = SiteApp::new(SiteConfig::load("site.toml")?.apply_env()?);
//! site.init_logging()?;
//! site.start().await?;
//!
//! let posts = site
//!     .query_client()
//!     .fetch_query(QueryKey::new("posts"), || async { api::posts().await })
//!     .await?;
//!
//! let page = site.boundary("blog", move || render_posts(&posts));
//! let html = page.render();
//! ```

mod site;

pub use site::*;

pub use sitekit_boundary;
pub use sitekit_core;
pub use sitekit_data;
pub use sitekit_observability;
pub use sitekit_query;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::SiteApp;
    pub use sitekit_boundary::*;
    pub use sitekit_core::*;
    pub use sitekit_data::*;
    pub use sitekit_observability::*;
    pub use sitekit_query::*;
}
