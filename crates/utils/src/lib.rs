//! Shared utilities for services built on ballotstore

pub mod tracing;
