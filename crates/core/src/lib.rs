//! Domain types and pure logic for the generation cache & cost engine.
//!
//! Everything here is I/O-free. Persistence lives behind the traits in
//! [`store`]; orchestration lives in `fabula-engine`.

pub mod analytics;
pub mod budget;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod hashing;
pub mod pricing;
pub mod request;
pub mod store;
pub mod tiering;
pub mod types;
