// Page-hierarchy versioning and inheritance engine.
//
// Pages form a tree; content lives in per-page version histories; publication
// state is derived from dates by a pure clock; layout, theme, and widgets
// resolve through the ancestor chain with per-slot merge policy. Transport,
// auth, and rendering live elsewhere.

// Pure logic: publication clock, slug handling
pub mod core;

// Domain entities: pages, versions, widgets, schedules, resolver output
pub mod models;

// Persistence, caching, and registry boundaries
pub mod infrastructure;

// Business operations: tree, versions, scheduling, inheritance resolution
pub mod services;

// Wiring facade
pub mod engine;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::Config;
pub use engine::PageEngine;
pub use error::{AppError, AppResult};

/// Install the global tracing subscriber, filtered by `RUST_LOG` with an
/// `info` default. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
