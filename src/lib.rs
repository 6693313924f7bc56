//! # HttpTrace Core
//!
//! In-process network capture engine for the HttpTrace debugging overlay.
//!
//! ## Features
//!
//! - Instrumentation of the global fetch and XHR primitives
//! - Interceptors for axios-style clients
//! - Bounded, newest-first record history with a subscription feed
//! - Body normalisation into inspectable payloads
//! - Export to JSON and cURL
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               UI collaborators (overlay)                 │
//! ├─────────────────────────────────────────────────────────┤
//! │                  api (control + feed)                    │
//! ├─────────────────────────────────────────────────────────┤
//! │                  HttpTrace Core (Rust)                   │
//! │  ┌──────────┐  ┌───────────┐  ┌─────────┐  ┌─────────┐  │
//! │  │ runtime  │  │ intercept │  │ models  │  │ storage │  │
//! │  │ fetch/xhr│──│ adapters  │──│ records │──│ buffer  │  │
//! │  └──────────┘  └───────────┘  └─────────┘  └─────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod intercept;
pub mod models;
pub mod runtime;
pub mod storage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
