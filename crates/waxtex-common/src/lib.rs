//! Common types, errors, and configuration for waxtex.
//!
//! This crate provides shared functionality used across the waxtex workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures and per-call option builders
//! - The fixed names of the sandbox surface (mount paths, environment
//!   variables, file names, entry points)

pub mod config;
pub mod error;
pub mod names;

pub use config::{CompileOptions, FormatOptions, RuntimeConfig};
pub use error::{CompileError, RuntimeError};
