//! HTTP surface helpers.
//!
//! Routing is left to the embedding service; this module only carries the
//! error mapping every route shares.

mod error;

pub use error::ErrorResponse;
