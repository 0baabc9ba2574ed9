//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors in addition to DB transport errors.
//! - Every contract has an implementation usable without a database file
//!   (in-memory SQLite or `MemoryKvStore`).

pub mod kv_store;
pub mod measurement_repo;
