//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument. Counter updates (hit
//! counts, month spend, alert stages) are expressed as atomic SQL so
//! correctness holds regardless of process/thread model.

pub mod budget_repo;
pub mod cache_entry_repo;
pub mod cost_record_repo;

pub use budget_repo::BudgetRepo;
pub use cache_entry_repo::CacheEntryRepo;
pub use cost_record_repo::CostRecordRepo;
