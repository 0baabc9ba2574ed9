//! Domain model for measurements and the achievement layer.
//!
//! # Responsibility
//! - Define the data structures shared by the engine, repositories and services.
//! - Own wire-shape conversions (device payloads, catalog JSON, persisted state).
//!
//! # Invariants
//! - Validated records and catalog definitions are immutable once built.
//! - The unlock ledger only grows between explicit data resets.

pub mod achievement;
pub mod ledger;
pub mod measurement;
