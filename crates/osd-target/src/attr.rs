// Path: crates/osd-target/src/attr.rs

//! Attribute retrieval and update.
//!
//! A `(page, number)` selector resolves to one attribute, a whole page, one
//! number across every page, or the whole object. The matches stream into
//! a caller buffer as list entries; running out of room ends the stream
//! and is not an error. The current command page, the timestamps page and
//! the collection tracking page are computed. Everything else comes from
//! the store.

use crate::bytes::get_u32;
use crate::list_entry::{
    fits, pack_attr, read_list_header, write_list_header, EntryFormat, Entries,
};
use crate::objfile::ObjectFiles;
use crate::tracking::CommandTracker;
use crate::vpage::{CommandTracking, CurrentCommand, Timestamps};
use osd_api::storage::{AttrRecord, AttributeRead, CatalogRead, CatalogWrite};
use osd_types::consts::*;
use osd_types::{ObjectType, OsdError, PageClass};
use std::path::Path;

/// Everything besides the store that attribute access needs.
#[derive(Debug, Clone, Copy)]
pub struct AttrContext<'a> {
    pub ccap: &'a CurrentCommand,
    pub tracking: &'a CommandTracker,
    pub files: &'a ObjectFiles,
    pub db_path: &'a Path,
    pub max_attr_len: usize,
}

/// One attribute chosen for output. `value` is `None` for an undefined one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub page: u32,
    pub number: u32,
    pub value: Option<Vec<u8>>,
}

impl Selected {
    fn defined(page: u32, number: u32, value: Vec<u8>) -> Self {
        Self {
            page,
            number,
            value: Some(value),
        }
    }

    pub fn undefined(page: u32, number: u32) -> Self {
        Self {
            page,
            number,
            value: None,
        }
    }

    /// Bytes the padded record takes in the given format.
    pub fn record_len(&self, fmt: EntryFormat) -> usize {
        let body = self.value.as_ref().map_or(0, Vec::len);
        crate::bytes::roundup8(fmt.header_len() + body)
    }
}

impl From<AttrRecord> for Selected {
    fn from(r: AttrRecord) -> Self {
        Self::defined(r.page, r.number, r.value)
    }
}

/// Outcome of streaming entries into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Streamed {
    pub written: usize,
    /// Every selected entry was stored whole.
    pub complete: bool,
}

fn is_virtual_timestamps(ty: ObjectType, page: u32) -> bool {
    ty == ObjectType::UserObject && page == USER_TMSTMP_PG
}

fn is_virtual_tracking(ty: ObjectType, page: u32) -> bool {
    ty == ObjectType::Collection && page == COLL_TRACKING_PG
}

fn pick(values: Vec<(u32, Vec<u8>)>, page: u32, number: u32) -> Vec<Selected> {
    values
        .into_iter()
        .filter(|(n, _)| number == ATTRNUM_GETALL || *n == number)
        .map(|(n, v)| Selected::defined(page, n, v))
        .collect()
}

/// Resolves a selector to the attributes it names.
///
/// A fully specific selector that matches nothing is `NotFound`, except for
/// number 0 which yields an empty page identification. Wildcards over an
/// existing object may yield nothing.
pub fn select<V>(
    view: &V,
    ctx: &AttrContext<'_>,
    pid: u64,
    oid: u64,
    page: u32,
    number: u32,
) -> Result<Vec<Selected>, OsdError>
where
    V: AttributeRead + CatalogRead + ?Sized,
{
    if page == CUR_CMD_ATTR_PG {
        let hits = pick(ctx.ccap.values(), page, number);
        return specific_or_placeholder(hits, page, number);
    }

    let ty = view.object_type(pid, oid)?;
    if ty == ObjectType::Illegal {
        return Err(OsdError::NotFound(format!("object {pid:#x}/{oid:#x}")));
    }

    if is_virtual_timestamps(ty, page) {
        let ts = Timestamps::collect(&ctx.files.path(pid, oid), ctx.db_path)?;
        return specific_or_placeholder(pick(ts.values(), page, number), page, number);
    }
    if is_virtual_tracking(ty, page) {
        let values = CommandTracking::page_values(ctx.tracking.find(pid, oid));
        return specific_or_placeholder(pick(values, page, number), page, number);
    }

    let records = match (page, number) {
        (GETALLATTR_PG, ATTRNUM_GETALL) => view.object_attrs(pid, oid)?,
        (GETALLATTR_PG, n) => view.number_attrs(pid, oid, n)?,
        (p, ATTRNUM_GETALL) => view.page_attrs(pid, oid, p)?,
        (p, n) => view
            .try_get_attr(pid, oid, p, n)?
            .map(|value| AttrRecord {
                page: p,
                number: n,
                value,
            })
            .into_iter()
            .collect(),
    };
    specific_or_placeholder(records.into_iter().map(Selected::from).collect(), page, number)
}

fn specific_or_placeholder(
    hits: Vec<Selected>,
    page: u32,
    number: u32,
) -> Result<Vec<Selected>, OsdError> {
    let specific = page != GETALLATTR_PG && number != ATTRNUM_GETALL;
    if !specific || !hits.is_empty() {
        return Ok(hits);
    }
    if number == ATTRNUM_PAGE_ID {
        return Ok(vec![Selected::defined(page, number, Vec::new())]);
    }
    Err(OsdError::NotFound(format!(
        "attribute {page:#x}/{number:#x}"
    )))
}

/// Packs entries until one does not fit whole.
pub fn stream(buf: &mut [u8], fmt: EntryFormat, entries: &[Selected]) -> Result<Streamed, OsdError> {
    let mut written = 0;
    for e in entries {
        let dst = buf.get_mut(written..).unwrap_or_default();
        let room = dst.len();
        let value_len = e.value.as_ref().map_or(0, Vec::len);
        match pack_attr(dst, fmt, e.page, e.number, e.value.as_deref()) {
            Ok(n) => written += n,
            Err(OsdError::Overflow) => return Ok(Streamed { written, complete: false }),
            Err(other) => return Err(other),
        }
        if !fits(fmt, value_len, room) {
            return Ok(Streamed { written, complete: false });
        }
    }
    Ok(Streamed {
        written,
        complete: true,
    })
}

/// Selects and streams one selector.
pub fn get_attr<V>(
    view: &V,
    ctx: &AttrContext<'_>,
    buf: &mut [u8],
    fmt: EntryFormat,
    pid: u64,
    oid: u64,
    page: u32,
    number: u32,
) -> Result<Streamed, OsdError>
where
    V: AttributeRead + CatalogRead + ?Sized,
{
    let entries = select(view, ctx, pid, oid, page, number)?;
    stream(buf, fmt, &entries)
}

/// Page-format retrieval. The computed pages use their fixed layouts; any
/// other page comes back as a retrieved-attributes list of its entries.
pub fn get_page<V>(
    view: &V,
    ctx: &AttrContext<'_>,
    buf: &mut [u8],
    pid: u64,
    oid: u64,
    page: u32,
) -> Result<usize, OsdError>
where
    V: AttributeRead + CatalogRead + ?Sized,
{
    let fixed = if page == CUR_CMD_ATTR_PG {
        Some(ctx.ccap.page_bytes())
    } else if is_virtual_timestamps(view.object_type(pid, oid)?, page) {
        Some(Timestamps::collect(&ctx.files.path(pid, oid), ctx.db_path)?.page_bytes())
    } else {
        None
    };
    if let Some(bytes) = fixed {
        let n = bytes.len().min(buf.len());
        crate::bytes::put(buf, 0, bytes.get(..n).unwrap_or_default())?;
        return Ok(n);
    }

    if buf.len() < LIST_HDR_LEN {
        return Ok(0);
    }
    let body = buf.get_mut(LIST_HDR_LEN..).unwrap_or_default();
    let s = get_attr(view, ctx, body, EntryFormat::Simple, pid, oid, page, ATTRNUM_GETALL)?;
    write_list_header(buf, RTRVD_SET_ATTR_LIST, s.written as u32)?;
    Ok(LIST_HDR_LEN + s.written)
}

/// Parses a retrieval list into its `(page, number)` pairs.
pub fn parse_get_list(list: &[u8]) -> Result<Vec<(u32, u32)>, OsdError> {
    let (ty, len) = read_list_header(list)?;
    if ty != RTRV_ATTR_LIST {
        return Err(OsdError::InvalidParameterList(format!(
            "retrieval list of type {ty:#x}"
        )));
    }
    if len % RTRV_ATTR_ENTRY_LEN != 0 || LIST_HDR_LEN + len > list.len() {
        return Err(OsdError::ParameterListLength(format!(
            "retrieval list of {len} bytes"
        )));
    }
    (0..len / RTRV_ATTR_ENTRY_LEN)
        .map(|i| {
            let at = LIST_HDR_LEN + i * RTRV_ATTR_ENTRY_LEN;
            match (get_u32(list, at), get_u32(list, at + 4)) {
                (Some(page), Some(number)) => Ok((page, number)),
                _ => Err(OsdError::ParameterListLength("retrieval entry".into())),
            }
        })
        .collect()
}

/// Resolves one requested pair for list output: a specific attribute that
/// is not set becomes an undefined entry instead of an error.
pub fn select_for_list<V>(
    view: &V,
    ctx: &AttrContext<'_>,
    pid: u64,
    oid: u64,
    page: u32,
    number: u32,
) -> Result<Vec<Selected>, OsdError>
where
    V: AttributeRead + CatalogRead + ?Sized,
{
    let specific = page != GETALLATTR_PG && number != ATTRNUM_GETALL;
    match select(view, ctx, pid, oid, page, number) {
        Err(e) if specific && e.is_not_found() => {
            if page != CUR_CMD_ATTR_PG && view.object_type(pid, oid)? == ObjectType::Illegal {
                return Err(e);
            }
            Ok(vec![Selected::undefined(page, number)])
        }
        other => other,
    }
}

/// List-format retrieval for one object, or for every object of a
/// multi-object create. Returns the bytes written, list header included.
pub fn get_list<V>(
    view: &V,
    ctx: &AttrContext<'_>,
    buf: &mut [u8],
    pairs: &[(u32, u32)],
    pid: u64,
    oids: &[u64],
    multi: bool,
) -> Result<usize, OsdError>
where
    V: AttributeRead + CatalogRead + ?Sized,
{
    if buf.len() < LIST_HDR_LEN {
        return Ok(0);
    }
    let mut used = LIST_HDR_LEN;
    'objects: for &oid in oids {
        let per_object;
        let ctx = if multi {
            per_object = ctx.ccap.for_object(oid);
            AttrContext {
                ccap: &per_object,
                ..*ctx
            }
        } else {
            *ctx
        };
        let fmt = if multi {
            EntryFormat::MultiObject(oid)
        } else {
            EntryFormat::Simple
        };
        for &(page, number) in pairs {
            let entries = select_for_list(view, &ctx, pid, oid, page, number)?;
            let s = stream(buf.get_mut(used..).unwrap_or_default(), fmt, &entries)?;
            used += s.written;
            if !s.complete {
                break 'objects;
            }
        }
    }
    let ty = if multi {
        RTRVD_CREATE_MULTIOBJ_LIST
    } else {
        RTRVD_SET_ATTR_LIST
    };
    write_list_header(buf, ty, (used - LIST_HDR_LEN) as u32)?;
    Ok(used)
}

/// Checks a set against the page rules without touching the store.
pub fn check_settable(
    ty: ObjectType,
    page: u32,
    number: u32,
    value: &[u8],
    max_attr_len: usize,
) -> Result<(), OsdError> {
    let bad = |why: &str| {
        Err(OsdError::InvalidArgument(format!(
            "set {page:#x}/{number:#x}: {why}"
        )))
    };
    if ObjectType::owning_page_range(page) != Some(ty) {
        return bad("page outside the object's range");
    }
    if !PageClass::of(page).is_settable() {
        return bad("page not settable");
    }
    if is_virtual_timestamps(ty, page) {
        return bad("timestamps are computed");
    }
    if is_virtual_tracking(ty, page) {
        return bad("command tracking is computed");
    }
    if number == ATTRNUM_UNMODIFIABLE {
        return bad("attribute number not settable");
    }
    if value.len() > max_attr_len {
        return bad("value too long");
    }
    if number == ATTRNUM_PAGE_ID
        && !value.is_empty()
        && (value.len() > ATTR_PAGE_ID_LEN || value.last() != Some(&0))
    {
        return bad("page identification must be a terminated string of at most 40 bytes");
    }
    Ok(())
}

/// Sets one attribute. An empty value deletes it. Entries of the user
/// object collections page also maintain the membership relation.
pub fn set_attr<W>(
    w: &W,
    ctx: &AttrContext<'_>,
    pid: u64,
    oid: u64,
    page: u32,
    number: u32,
    value: &[u8],
) -> Result<(), OsdError>
where
    W: CatalogWrite + ?Sized,
{
    let ty = w.object_type(pid, oid)?;
    if ty == ObjectType::Illegal {
        return Err(OsdError::NotFound(format!("object {pid:#x}/{oid:#x}")));
    }
    check_settable(ty, page, number, value, ctx.max_attr_len)?;

    if ty == ObjectType::UserObject && page == USER_COLL_PG {
        if let Some(old) = w.try_get_attr(pid, oid, page, number)? {
            if let Some(old_cid) = crate::bytes::get_u64(&old, 0) {
                w.remove_member(pid, old_cid, oid, number)?;
            }
        }
        if !value.is_empty() {
            let cid = match value.try_into() {
                Ok(b) => u64::from_be_bytes(b),
                Err(_) => {
                    return Err(OsdError::InvalidArgument(
                        "collection pointer must be 8 bytes".into(),
                    ))
                }
            };
            if w.object_type(pid, cid)? != ObjectType::Collection {
                return Err(OsdError::InvalidArgument(format!(
                    "{pid:#x}/{cid:#x} is not a collection"
                )));
            }
            w.insert_member(pid, cid, oid, number)?;
        }
    }

    if value.is_empty() {
        w.delete_attr(pid, oid, page, number)?;
    } else {
        w.set_attr(pid, oid, page, number, value)?;
    }
    tracing::trace!(target: "attr", pid, oid, page, number, len = value.len(), "set");
    Ok(())
}

/// Applies a set-attributes list to one object.
pub fn set_list<W>(
    w: &W,
    ctx: &AttrContext<'_>,
    list: &[u8],
    pid: u64,
    oid: u64,
) -> Result<usize, OsdError>
where
    W: CatalogWrite + ?Sized,
{
    let mut applied = 0;
    for entry in parse_set_list(list)? {
        let (page, number, value) = entry;
        set_attr(w, ctx, pid, oid, page, number, value).map_err(|e| match e {
            OsdError::InvalidArgument(m) | OsdError::NotFound(m) => OsdError::InvalidParameterList(m),
            other => other,
        })?;
        applied += 1;
    }
    Ok(applied)
}

/// Decodes a set-attributes list into `(page, number, value)` triples.
pub fn parse_set_list(list: &[u8]) -> Result<Vec<(u32, u32, &[u8])>, OsdError> {
    let (ty, len) = read_list_header(list)?;
    if ty != RTRVD_SET_ATTR_LIST {
        return Err(OsdError::InvalidParameterList(format!(
            "set list of type {ty:#x}"
        )));
    }
    let body = list
        .get(LIST_HDR_LEN..LIST_HDR_LEN + len)
        .ok_or_else(|| OsdError::ParameterListLength(format!("set list of {len} bytes")))?;
    Entries::new(body, false)
        .map(|e| {
            let e = e?;
            let value = e.value.ok_or_else(|| {
                OsdError::InvalidParameterList("set entry with undefined length".into())
            })?;
            Ok((e.page, e.number, value))
        })
        .collect()
}
