// Path: crates/osd-target/src/list.rs

//! LIST and LIST COLLECTION results.
//!
//! Ids are enumerated ascending from the requested initial id. The first id
//! that does not fit whole becomes the continuation id of the result, and
//! ids after it are still counted in the additional length.

use crate::attr::{stream, Selected};
use crate::bytes::{put_u32, put_u64};
use crate::list_entry::EntryFormat;
use ahash::AHashSet;
use osd_types::consts::*;
use osd_types::OsdError;
use std::collections::VecDeque;

const CONT_ID_OFF: usize = 8;
const LIST_ID_OFF: usize = 16;
/// Enumerations left open at once. Abandoned ones are retired oldest first.
pub const MAX_OPEN_LISTS: usize = 64;

/// Result of one list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOutcome {
    /// Bytes stored in the output buffer.
    pub written: usize,
    /// First id left out, 0 when the enumeration is complete.
    pub cont_id: u64,
}

/// Tracks the list identifiers of enumerations that are still open.
#[derive(Debug)]
pub struct ListRegistry {
    next: u32,
    live: AHashSet<u32>,
    /// Open identifiers in the order they were handed out.
    order: VecDeque<u32>,
}

impl Default for ListRegistry {
    fn default() -> Self {
        Self {
            next: 1,
            live: AHashSet::new(),
            order: VecDeque::new(),
        }
    }
}

impl ListRegistry {
    /// A follow-up call must present an identifier this target handed out.
    pub fn check(&self, list_id: u32) -> Result<(), OsdError> {
        if list_id == 0 || self.live.contains(&list_id) {
            Ok(())
        } else {
            Err(OsdError::InvalidArgument(format!(
                "unknown list identifier {list_id:#x}"
            )))
        }
    }

    /// Returns the identifier to report for a finished call: a fresh one
    /// when a new enumeration stays open, none once it completes.
    pub fn settle(&mut self, list_id: u32, cont_id: u64) -> u32 {
        if cont_id == 0 {
            if self.live.remove(&list_id) {
                self.order.retain(|&id| id != list_id);
            }
            return list_id;
        }
        if list_id != 0 {
            return list_id;
        }
        loop {
            let id = self.next;
            self.next = self.next.wrapping_add(1).max(1);
            if self.live.insert(id) {
                self.order.push_back(id);
                self.evict();
                return id;
            }
        }
    }

    fn evict(&mut self) {
        while self.order.len() > MAX_OPEN_LISTS {
            if let Some(old) = self.order.pop_front() {
                self.live.remove(&old);
                tracing::debug!(target: "list", list_id = old, "abandoned list identifier retired");
            }
        }
    }

    pub fn open_lists(&self) -> usize {
        self.live.len()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.order.clear();
    }
}

fn write_header(out: &mut [u8], total: usize, cont_id: u64, list_id: u32, tag: u8) -> usize {
    let mut header = ((total - 8) as u64).to_be_bytes().to_vec();
    header.extend_from_slice(&cont_id.to_be_bytes());
    header.extend_from_slice(&list_id.to_be_bytes());
    header.resize(ML_ODL_OFF, 0);
    if let Some(b) = header.get_mut(LIST_FMT_OFF) {
        *b = tag;
    }
    let n = header.len().min(out.len());
    if let (Some(dst), Some(src)) = (out.get_mut(..n), header.get(..n)) {
        dst.copy_from_slice(src);
    }
    n
}

/// Rewrites the list identifier of a result already in `out`, as much of
/// it as the allocation holds.
pub fn patch_list_id(out: &mut [u8], list_id: u32) {
    let dst = out.iter_mut().skip(LIST_ID_OFF);
    for (d, s) in dst.zip(list_id.to_be_bytes()) {
        *d = s;
    }
}

/// Id-only result.
pub fn list_ids(out: &mut [u8], ids: &[u64], list_id: u32) -> ListOutcome {
    let total = ML_ODL_OFF + ids.len() * 8;
    let mut tail = ML_ODL_OFF;
    let mut cont_id = 0;
    for &id in ids {
        if put_u64(out, tail, id).is_err() {
            cont_id = id;
            break;
        }
        tail += 8;
    }
    let hdr = write_header(out, total, cont_id, list_id, LIST_FMT_IDS);
    ListOutcome {
        written: if hdr < ML_ODL_OFF { hdr } else { tail },
        cont_id,
    }
}

/// Ids each followed by an attribute sub-list.
///
/// Each object descriptor is `oid(8) reserved(4) length(4)` and its length
/// covers the entries after it. The descriptor is written first with a zero
/// length at the head position, entries are appended at the tail, and the
/// length is patched once the tail is known. An object whose descriptor
/// and entries do not all fit is left out whole and becomes the
/// continuation id.
pub fn list_with_attrs<F>(
    out: &mut [u8],
    ids: &[u64],
    list_id: u32,
    mut attrs_of: F,
) -> Result<ListOutcome, OsdError>
where
    F: FnMut(u64) -> Result<Vec<Selected>, OsdError>,
{
    let mut total = ML_ODL_OFF;
    let mut tail = ML_ODL_OFF;
    let mut cont_id = 0;
    for &oid in ids {
        let entries = attrs_of(oid)?;
        let sub_len: usize = entries
            .iter()
            .map(|e| e.record_len(EntryFormat::Simple))
            .sum();
        let need = LIST_ATTR_DESC_LEN + sub_len;
        total += need;
        if cont_id != 0 {
            continue;
        }
        if tail + need > out.len() {
            cont_id = oid;
            continue;
        }

        let head = tail;
        put_u64(out, head, oid)?;
        put_u32(out, head + 8, 0)?;
        put_u32(out, head + LIST_ATTR_DESC_LEN_OFF, 0)?;
        tail += LIST_ATTR_DESC_LEN;
        let s = stream(
            out.get_mut(tail..).unwrap_or_default(),
            EntryFormat::Simple,
            &entries,
        )?;
        tail += s.written;
        put_u32(
            out,
            head + LIST_ATTR_DESC_LEN_OFF,
            (tail - head - LIST_ATTR_DESC_LEN) as u32,
        )?;
    }
    let hdr = write_header(out, total, cont_id, list_id, LIST_FMT_IDS_ATTRS);
    Ok(ListOutcome {
        written: if hdr < ML_ODL_OFF { hdr } else { tail },
        cont_id,
    })
}
