//! Error types for the core crate

use thiserror::Error;

/// Core audio errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid audio frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid filter configuration: {0}")]
    InvalidFilter(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;
