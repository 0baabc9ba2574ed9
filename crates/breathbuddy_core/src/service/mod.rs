//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate the engine and repositories into use-case level APIs.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod achievement_service;
pub mod measurement_service;
