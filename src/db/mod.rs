//! Database module: SQLite record source for sitemap generation.
//!
//! This module is split into two submodules:
//! - `model`: decoded rows (`RecordRow`) and their values (`ColumnValue`).
//! - `repo`: pool setup, the `RecordQuery` builder and the `TableSource`
//!   record source.
//!
//! External modules should import from `record_sitemap::db`; the repository
//! API and the row models are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{ColumnValue, RecordRow};
