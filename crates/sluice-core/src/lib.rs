pub mod config;
pub mod error;
pub mod types;

pub use config::SluiceConfig;
pub use error::ConfigError;
pub use types::*;
