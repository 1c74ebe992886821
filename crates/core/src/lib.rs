//! Incremental synchronization of a paginated location listing source into
//! local target records.
//!
//! The engine is storage- and transport-agnostic: it drives a
//! [`source::SourceClient`], a [`repository::TargetRepository`] and a
//! [`state::StateStore`] supplied by the host.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fields;
pub mod filters;
pub mod import;
pub mod memory;
pub mod migrate;
pub mod record;
pub mod repository;
pub mod resolve;
pub mod source;
pub mod state;
pub mod store;
pub mod sweep;
pub mod target;
pub mod types;
pub mod value;

pub use engine::{SyncEngine, SyncStatus};
pub use error::{SyncError, SyncResult};
