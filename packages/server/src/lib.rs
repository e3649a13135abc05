//! Core library for the product-data acquisition service.
//!
//! The kernel owns the moving parts (job repository, platform lock,
//! browser pool, workflow engine, result writer, per-platform workers);
//! the server module is a thin axum surface over the kernel.

pub mod common;
pub mod kernel;
pub mod server;
