//! Row structs for the engine's tables.
//!
//! Each submodule contains a `FromRow` struct matching the database row plus
//! a fallible conversion into the corresponding `fabula_core` entity (labels
//! stored as TEXT are parsed back into their closed enums).

pub mod budget;
pub mod cache_entry;
pub mod cost_record;
