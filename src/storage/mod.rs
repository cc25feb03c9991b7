//! Storage collaborators: the leaf source (track table) and the root store.
//!
//! - [`memory`]: in-process implementations for tests and embedding
//! - [`sql`]: SQLite / MySQL / Postgres via sqlx `Any`
//! - [`redis`]: root record cache for read-heavy web tiers

pub mod memory;
pub mod redis;
pub mod sql;
pub mod traits;
