// Public modules
pub mod config;
pub mod error;
pub mod files;
pub mod placeholder;
pub mod rewrite;

// Re-export common types for convenience
pub use config::Settings;
pub use error::{Error, ErrorCode, Result};
