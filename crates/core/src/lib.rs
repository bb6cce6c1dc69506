//! `salesdesk-core` -- pure domain logic for the Salesdesk backend.
//!
//! Nothing in this crate touches the database. Persistence is reached only
//! through the traits defined here and implemented by `salesdesk-db`.

pub mod error;
pub mod import_diagnostics;
pub mod redaction;
pub mod types;
