//! Integration Tests
//!
//! Cross-crate tests through the public facade, organized by concern:
//! - Cache: fill-once, bypass, staleness, fingerprints
//! - Transactions: atomic batches, idempotent commit, exit actions
//! - Scheduler: re-queue, dead letters, background flushing
//! - Config: `dataaccess.toml` driving a context

#[path = "../common/mod.rs"]
mod common;

mod cache;
mod config;
mod scheduler;
mod transactions;
