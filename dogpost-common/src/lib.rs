//! # dogpost Common Library
//!
//! Shared code for the dogpost publisher including:
//! - Common error type
//! - TOML bootstrap configuration and config file discovery
//! - Environment-over-TOML value resolution
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
