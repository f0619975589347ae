// Path: crates/osd-api/src/lib.rs
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

//! # OSD API
//!
//! The seams between the command engine and its backing store: the
//! attribute store and catalog traits, and the structured query
//! representation that a storage adapter lowers to its own access paths.

/// Query criteria, combinators and the executor trait.
pub mod query;
/// Attribute store and catalog traits.
pub mod storage;
