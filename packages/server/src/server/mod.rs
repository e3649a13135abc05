//! The HTTP surface: a thin axum layer over the kernel.

pub mod app;
pub mod routes;

pub use app::{create_app, AppState};
