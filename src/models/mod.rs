//! Data models persisted by the service.
//!
//! These map to database tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod video;
