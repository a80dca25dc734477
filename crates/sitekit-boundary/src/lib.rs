//! Render-failure guard for SiteKit views.
//!
//! This crate isolates failures while producing UI output:
//! - `View` - Anything that renders to HTML
//! - `ErrorBoundary` - Two-state guard (`Normal` / `Failed`) around a view
//! - `FallbackRenderer` / `DefaultFallback` - What a failed boundary shows
//! - `ErrorReporter` / `Reloader` - Collaborators for logging and hard reloads
//!
//! Only synchronous failures during `render` are intercepted. Errors from
//! spawned tasks or callbacks after the render pass are out of reach.

mod boundary;
mod collaborators;
mod fallback;
mod view;

pub use boundary::*;
pub use collaborators::*;
pub use fallback::*;
pub use view::*;
