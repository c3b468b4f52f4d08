pub mod config;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod registries;
pub mod sources;
pub mod traits;

// Re-export common types for convenience
pub use config::{Config, ConfigError};
pub use model::*;
pub use traits::*;
