//! Data models for HttpTrace
//!
//! These are the shapes handed to UI consumers through the subscription feed.

pub mod config;
pub mod payload;
pub mod record;
pub mod stats;

pub use config::*;
pub use payload::*;
pub use record::*;
pub use stats::*;
