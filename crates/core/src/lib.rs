//! Core types, errors, and streaming primitives for the `ballotstore` storage layer.
//!
//! Every storage backend and every consumer of the storage protocol shares the
//! building blocks defined here.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the `Error` enum, the `Result` alias and the coarse
//!   `ErrorKind` classification callers use to tell "not found", "already
//!   exists" and "unexpected value" apart without string matching.
//! - **`context`**: The cancellable execution `Context` passed to every
//!   protocol operation, carrying an optional deadline.
//! - **`types`**: Stored `Entry` values and the `Protocol` identifier used by
//!   the backend registry.
//! - **`stream`**: `PrefixStream`, the lazy result stream of prefix scans.

pub mod context;
pub mod errors;
pub mod stream;
pub mod types;

pub use self::{
    context::Context,
    errors::{BoxError, Error, ErrorKind, Result},
    stream::{EntrySender, PrefixStream},
    types::{Entry, Protocol},
};
