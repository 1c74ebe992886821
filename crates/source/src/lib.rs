//! HTTP Source Client for the location listing API.
//!
//! [`api::LocationApi`] implements [`locsync_core::source::SourceClient`]
//! on top of [`reqwest`].

pub mod api;
pub mod config;
pub mod error;

pub use api::{ConnectionTest, LocationApi};
pub use config::SourceConfig;
pub use error::SourceApiError;
