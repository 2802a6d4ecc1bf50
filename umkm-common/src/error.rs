//! Error raised when a loaded configuration cannot run the service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A cross-field requirement of the configuration is not met.
    #[error("Configuration error: {0}")]
    Config(String),
}
