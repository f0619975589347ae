// Path: crates/osd-types/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # OSD Types
//!
//! Core data structures shared by every crate of the object storage target:
//! the protocol constants that fix the binary layouts, the object and page
//! model, the error taxonomy and the target configuration.

/// Target configuration loaded from TOML.
pub mod config;
/// Protocol constants: page ranges, list formats, well-known attributes.
pub mod consts;
/// Error enums and the `ErrorCode` trait.
pub mod error;
/// Object types and page classification.
pub mod object;

pub use error::{ErrorCode, OsdError, RetryHint, StorageError};
pub use object::{ObjectType, PageClass};
