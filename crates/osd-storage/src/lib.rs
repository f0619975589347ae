// Path: crates/osd-storage/src/lib.rs
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

//! Pure-Rust persistent storage for the object target.
//!
//! One redb database holds four tables with prefix-encoded big-endian keys:
//! OBJECTS `[pid][oid] -> type`, ATTRS `[pid][oid][page][number] -> value`,
//! MEMBERS `[pid][cid][oid] -> number` and its reverse index
//! MEMBER_OF `[pid][oid][cid] -> number`. Every command runs inside one
//! redb transaction, so a failed command leaves nothing behind.

pub mod keys;
pub mod metrics;
pub mod query;
pub mod redb_store;

pub use redb_store::{ReadView, RedbObjectStore, WriteView};
