//! Row structs matching the database tables.

pub mod sync_state;
pub mod target_record;
