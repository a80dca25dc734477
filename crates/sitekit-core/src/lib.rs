//! Core configuration for SiteKit sites.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `SiteConfig` - Site constants, query defaults and analytics settings
//! - `RuntimeMode` - Development / test / production switch
//! - `ThemePreference` - Light, dark or system color theme

mod config;
mod mode;
mod theme;

pub use config::*;
pub use mode::*;
pub use theme::*;
