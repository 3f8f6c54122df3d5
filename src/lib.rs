//! Subtrack library
//!
//! Multi-tenant subscription tracking: families, providers, labels and
//! subscriptions guarded by plan entitlements, plus spending summaries.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logger;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod state;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}
