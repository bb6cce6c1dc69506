//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod import_log_repo;

pub use import_log_repo::ImportLogRepo;
