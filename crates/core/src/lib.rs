pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{Config, PacingConfig, MODEL_ENV_VAR};
pub use error::{Error, Result};
pub use paths::Paths;
