//! FFI crate root exposing Flutter-facing APIs.

pub mod api;
