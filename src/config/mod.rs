/// Database configuration and connection management
pub mod database;

/// Program settings loading from config.toml
pub mod program;
