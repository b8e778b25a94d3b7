//! Orchestration layer for the generation cache & cost engine.
//!
//! [`optimizer::CacheOptimizer`] is the surface the application calls:
//! fingerprint -> tiered match -> (on miss, the caller generates) -> commit,
//! which accounts cost, backfills the cache, updates the budget ledger, and
//! emits any threshold alerts. Storage is reached only through the traits in
//! `fabula_core::store`; [`memory::MemoryStore`] is the in-memory reference
//! implementation.

pub mod analytics;
pub mod budget;
pub mod matcher;
pub mod memory;
pub mod optimizer;
