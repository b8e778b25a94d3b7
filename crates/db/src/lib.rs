//! Postgres persistence for the generation cache & cost engine.
//!
//! `models` holds `FromRow` row structs mirroring the core entities;
//! `repositories` holds the query layer; `store` adapts the repositories to
//! the seam traits in `fabula_core::store`. Schema ownership (migrations,
//! eviction jobs) lives with the surrounding application.

pub mod models;
pub mod repositories;
pub mod store;
