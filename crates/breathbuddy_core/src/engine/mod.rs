//! Achievement progress engine.
//!
//! # Responsibility
//! - Evaluate catalog rules over a measurement history (`progress`).
//! - Plan ledger transitions for rules that newly reach their target (`unlock`).
//!
//! # Invariants
//! - Everything in this module is pure. Persistence lives in `service`.

pub mod progress;
pub mod unlock;
