//! Error types and classification for storage operations

mod builders;
mod conversions;
mod kind;
mod types;

pub use kind::ErrorKind;
pub use types::{BoxError, Error, Result, SharedError};
