// Path: crates/osd-target/src/query.rs

//! QUERY: decodes the criteria list from data-out into a [`QueryPlan`],
//! runs it against the store and writes the matching ids.
//!
//! The result buffer holds a 24-byte header and then one 8-byte id per
//! match. Matches that do not fit are still counted in the header's
//! additional length.

use crate::bytes::{get_u16, get_u32};
use osd_api::query::{Combinator, Criterion, QueryExecutor, QueryPlan};
use osd_api::storage::CatalogRead;
use osd_types::consts::*;
use osd_types::{ObjectType, OsdError};

fn bad(what: impl Into<String>) -> OsdError {
    OsdError::InvalidParameterList(what.into())
}

/// Decodes a query list.
///
/// Each criterion is `reserved(2) len(2) page(4) number(4) min_len(2) min
/// max_len(2) max`, `len` counting the bytes after its first four. A zero
/// bound length leaves that side open. A zero `len` ends the list.
pub fn parse_query_list(list: &[u8], pid: u64, cid: u64) -> Result<QueryPlan, OsdError> {
    let head = list
        .first()
        .ok_or_else(|| OsdError::ParameterListLength("empty query list".into()))?;
    let combinator = match head & 0x0F {
        QUERY_UNION => Combinator::Union,
        QUERY_INTERSECT => Combinator::Intersect,
        other => return Err(bad(format!("query type {other:#x}"))),
    };
    if list.len() < QUERY_LIST_HDR_LEN {
        return Err(OsdError::ParameterListLength("short query list".into()));
    }

    let mut builder = QueryPlan::builder(pid, cid).combinator(combinator);
    let mut at = QUERY_LIST_HDR_LEN;
    while at + 4 <= list.len() {
        let len = usize::from(get_u16(list, at + 2).unwrap_or_default());
        if len == 0 {
            break;
        }
        let body = list
            .get(at + 4..at + 4 + len)
            .ok_or_else(|| bad("criterion longer than the list"))?;
        builder = builder.criterion(parse_criterion(body)?);
        at += 4 + len;
    }
    Ok(builder.build())
}

fn parse_criterion(body: &[u8]) -> Result<Criterion, OsdError> {
    let short = || bad("truncated criterion");
    let page = get_u32(body, 0).ok_or_else(short)?;
    let number = get_u32(body, 4).ok_or_else(short)?;
    let min_len = usize::from(get_u16(body, 8).ok_or_else(short)?);
    let min = body.get(10..10 + min_len).ok_or_else(short)?;
    let max_at = 10 + min_len;
    let max_len = usize::from(get_u16(body, max_at).ok_or_else(short)?);
    let max = body
        .get(max_at + 2..max_at + 2 + max_len)
        .ok_or_else(short)?;

    let mut c = Criterion::new(page, number);
    if !min.is_empty() {
        c = c.with_min(min);
    }
    if !max.is_empty() {
        c = c.with_max(max);
    }
    Ok(c)
}

/// Writes the result and returns the bytes stored in `out`.
pub fn write_result(out: &mut [u8], ids: &[u64]) -> usize {
    let total = ML_ODL_OFF + ids.len() * 8;
    let mut header = ((total - 8) as u64).to_be_bytes().to_vec();
    header.resize(ML_ODL_OFF, 0);
    if let Some(tag) = header.get_mut(QUERY_FMT_OFF) {
        *tag = LIST_FMT_IDS;
    }

    let hdr = header.len().min(out.len());
    if let (Some(dst), Some(src)) = (out.get_mut(..hdr), header.get(..hdr)) {
        dst.copy_from_slice(src);
    }
    let mut used = hdr;
    for id in ids {
        match out.get_mut(used..used + 8) {
            Some(dst) => dst.copy_from_slice(&id.to_be_bytes()),
            None => break,
        }
        used += 8;
    }
    used
}

/// Runs a QUERY against collection `cid` of partition `pid`.
pub fn run<V>(view: &V, plan: &QueryPlan, out: &mut [u8]) -> Result<usize, OsdError>
where
    V: QueryExecutor + CatalogRead + ?Sized,
{
    if view.object_type(plan.pid, plan.cid)? != ObjectType::Collection {
        return Err(OsdError::InvalidArgument(format!(
            "{:#x}/{:#x} is not a collection",
            plan.pid, plan.cid
        )));
    }
    let ids = view.execute_query(plan)?;
    tracing::debug!(
        target: "query",
        pid = plan.pid,
        cid = plan.cid,
        criteria = plan.criteria.len(),
        matches = ids.len(),
        "query executed"
    );
    Ok(write_result(out, &ids))
}

/// Encodes one criterion, for initiators and tests.
pub fn encode_criterion(out: &mut Vec<u8>, c: &Criterion) {
    let min = c.min.as_deref().unwrap_or_default();
    let max = c.max.as_deref().unwrap_or_default();
    let len = 12 + min.len() + max.len();
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&c.page.to_be_bytes());
    out.extend_from_slice(&c.number.to_be_bytes());
    out.extend_from_slice(&(min.len() as u16).to_be_bytes());
    out.extend_from_slice(min);
    out.extend_from_slice(&(max.len() as u16).to_be_bytes());
    out.extend_from_slice(max);
}

/// Encodes a whole query list.
pub fn encode_query_list(combinator: Combinator, criteria: &[Criterion]) -> Vec<u8> {
    let ty = match combinator {
        Combinator::Union => QUERY_UNION,
        Combinator::Intersect => QUERY_INTERSECT,
    };
    let mut out = vec![ty, 0, 0, 0];
    for c in criteria {
        encode_criterion(&mut out, c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::get_u64;

    #[test]
    fn list_round_trips_through_parser() {
        let criteria = vec![
            Criterion::new(0x10000, 1)
                .with_min(40u64.to_be_bytes())
                .with_max(80u64.to_be_bytes()),
            Criterion::new(0x10000, 2).with_max(b"m".to_vec()),
            Criterion::new(0x10001, 3),
        ];
        let list = encode_query_list(Combinator::Intersect, &criteria);
        let plan = parse_query_list(&list, 1, 2).unwrap();
        assert_eq!(plan.combinator, Combinator::Intersect);
        assert_eq!(plan.criteria, criteria);
        assert_eq!((plan.pid, plan.cid), (1, 2));
    }

    #[test]
    fn header_only_list_has_no_criteria() {
        let plan = parse_query_list(&[QUERY_UNION, 0, 0, 0], 1, 2).unwrap();
        assert!(plan.criteria.is_empty());
        let padded = parse_query_list(&[QUERY_UNION, 0, 0, 0, 0, 0, 0, 0], 1, 2).unwrap();
        assert!(padded.criteria.is_empty());
    }

    #[test]
    fn malformed_lists_are_rejected() {
        assert!(matches!(
            parse_query_list(&[7, 0, 0, 0], 1, 2),
            Err(OsdError::InvalidParameterList(_))
        ));
        assert!(matches!(
            parse_query_list(&[], 1, 2),
            Err(OsdError::ParameterListLength(_))
        ));
        let mut list = encode_query_list(Combinator::Union, &[Criterion::new(1, 1)]);
        list.truncate(list.len() - 1);
        assert!(parse_query_list(&list, 1, 2).is_err());
    }

    #[test]
    fn overflow_is_counted_not_copied() {
        let ids = [5u64, 6, 7, 8];
        let mut out = [0u8; ML_ODL_OFF + 16];
        let used = write_result(&mut out, &ids);
        assert_eq!(used, ML_ODL_OFF + 16);
        assert_eq!(get_u64(&out, 0), Some((ML_ODL_OFF + 32 - 8) as u64));
        assert_eq!(out[QUERY_FMT_OFF], LIST_FMT_IDS);
        assert_eq!(get_u64(&out, ML_ODL_OFF), Some(5));
        assert_eq!(get_u64(&out, ML_ODL_OFF + 8), Some(6));

        let mut tiny = [0u8; 10];
        assert_eq!(write_result(&mut tiny, &ids), 10);
        assert_eq!(get_u64(&tiny, 0), Some((ML_ODL_OFF + 32 - 8) as u64));
    }
}
