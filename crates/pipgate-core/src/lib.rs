use error::EngineError;

pub mod batch;
pub mod error;
pub mod eval;
pub mod host;
pub mod manager;
pub mod snapshot;
pub mod spec;

pub type EngineResult<T> = std::result::Result<T, EngineError>;
