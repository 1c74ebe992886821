//! Repositories: zero-sized structs whose async functions take a `&PgPool`.

pub mod sync_state_repo;
pub mod target_record_repo;

pub use sync_state_repo::SyncStateRepo;
pub use target_record_repo::TargetRecordRepo;
