//! HttpTrace API
//!
//! The public entry points UI layers call. Everything here is a thin facade
//! over the interceptor registry and the record store.

pub mod logger_api;

pub use logger_api::*;
