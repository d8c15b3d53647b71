//! Crate-level error type.
//!
//! Component errors (`FetchError`, `SinkError`, `LoadError`, ...) live next to
//! the component that raises them; this enum is what a whole pipeline step
//! surfaces to the run loop.

use thiserror::Error;

use crate::load::LoadError;
use crate::sink::SinkError;
use crate::transform::TransformError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unusable configuration. Fatal before any network call.
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}
