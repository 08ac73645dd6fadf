//! Configuration and error types shared by every Vigil component.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, LogLevel, LoggingConfig, ProbeConfig};
pub use error::{Result, VigilError};
