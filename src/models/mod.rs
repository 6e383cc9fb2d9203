//! Core data models for the wardrobe catalog.
//!
//! These map to SQLite rows via `sqlx::FromRow` and serialize as JSON via
//! `serde`.

pub mod graph;
pub mod item;
pub mod matches;
pub mod object;
pub mod upload;
