//! Compliance review API (axum).

pub mod routes;
pub mod types;

pub use routes::{build_router, AppState};
