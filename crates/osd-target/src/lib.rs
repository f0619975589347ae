// Path: crates/osd-target/src/lib.rs
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

//! # OSD Target
//!
//! The command engine of the object storage target. A [`Target`] owns the
//! attribute/catalog store and the object data files; [`Target::execute`]
//! takes one 200-byte command descriptor block plus its data-out buffer and
//! returns the data-in buffer and, on failure, descriptor-format sense data.
//!
//! Commands that mutate anything run inside one store write transaction,
//! so a failed command leaves no partial object, attribute or membership
//! behind. Read-only commands observe one snapshot.

/// Attribute retrieval multiplexer and set-attribute rules.
pub mod attr;
/// Checked big-endian field access.
pub mod bytes;
/// CDB decoding and building.
pub mod cdb;
/// Per-service-action handlers.
pub mod dispatch;
/// Attribute list-entry codec.
pub mod list_entry;
/// LIST and LIST COLLECTION result generation.
pub mod list;
/// Object data files.
pub mod objfile;
/// QUERY list parsing and result generation.
pub mod query;
/// Sense data construction and parsing.
pub mod sense;
/// The target instance and its response type.
pub mod target;
/// Collection command tracking records.
pub mod tracking;
/// Computed attribute pages.
pub mod vpage;

pub use cdb::{Cdb, CdbBuilder, ServiceAction};
pub use target::{Response, Status, Target};
