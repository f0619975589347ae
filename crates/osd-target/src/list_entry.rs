// Path: crates/osd-target/src/list_entry.rs

//! The attribute list-entry codec.
//!
//! A simple entry is `page(4) number(4) length(2) value pad` and a
//! multi-object entry prefixes the object id, `oid(8) page(4) number(4)
//! length(2) value pad`. Records are zero-padded to a multiple of 8 bytes.
//! A destination too small for the header is an `Overflow`; one that fits
//! the header but not the value gets a truncated copy with the declared
//! length left intact, which the caller treats as "ran out of room".

use crate::bytes::{get_u16, get_u32, get_u64, put, put_u16, put_u32, put_u64, put_u8, roundup8};
use osd_types::consts::*;
use osd_types::OsdError;

/// Which of the two record layouts to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    Simple,
    /// Multi-object layout carrying the given object id.
    MultiObject(u64),
}

impl EntryFormat {
    pub fn header_len(self) -> usize {
        match self {
            Self::Simple => LE_VAL_OFF,
            Self::MultiObject(_) => MLE_VAL_OFF,
        }
    }
}

/// A decoded list entry borrowing its value from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry<'a> {
    pub oid: Option<u64>,
    pub page: u32,
    pub number: u32,
    /// `None` when the entry carries the undefined-length sentinel.
    pub value: Option<&'a [u8]>,
}

/// Packs one attribute and returns the bytes written: header, value bytes
/// that fit, and as much padding as fits.
pub fn pack_attr(
    buf: &mut [u8],
    fmt: EntryFormat,
    page: u32,
    number: u32,
    value: Option<&[u8]>,
) -> Result<usize, OsdError> {
    let hdr = fmt.header_len();
    if buf.len() < hdr {
        return Err(OsdError::Overflow);
    }
    let declared = match value {
        Some(v) if v.len() > MAX_ATTR_VAL_LEN => {
            return Err(OsdError::InvalidArgument(format!(
                "attribute value of {} bytes exceeds the list entry limit",
                v.len()
            )))
        }
        Some(v) => v.len() as u16,
        None => NULL_ATTR_LEN,
    };

    let (page_off, number_off, len_off) = match fmt {
        EntryFormat::Simple => (LE_PAGE_OFF, LE_NUMBER_OFF, LE_LEN_OFF),
        EntryFormat::MultiObject(oid) => {
            put_u64(buf, MLE_OID_OFF, oid)?;
            (MLE_PAGE_OFF, MLE_NUMBER_OFF, MLE_LEN_OFF)
        }
    };
    put_u32(buf, page_off, page)?;
    put_u32(buf, number_off, number)?;
    put_u16(buf, len_off, declared)?;

    let value = value.unwrap_or_default();
    let room = buf.len() - hdr;
    let copied = value.len().min(room);
    put(buf, hdr, value.get(..copied).unwrap_or_default())?;

    let unpadded = hdr + copied;
    let padded = roundup8(hdr + value.len()).min(buf.len());
    for off in unpadded..padded {
        put_u8(buf, off, 0)?;
    }
    Ok(padded.max(unpadded))
}

/// Whether a pack into `room` bytes stores the whole record.
pub fn fits(fmt: EntryFormat, value_len: usize, room: usize) -> bool {
    room >= fmt.header_len() + value_len
}

/// Decodes one entry and returns it with the number of bytes consumed,
/// padding included when present.
pub fn unpack_attr(buf: &[u8], multi: bool) -> Result<(ListEntry<'_>, usize), OsdError> {
    let bad = |what: &str| OsdError::InvalidParameterList(format!("list entry {what}"));
    let (oid, base) = if multi {
        (Some(get_u64(buf, MLE_OID_OFF).ok_or_else(|| bad("truncated"))?), MLE_PAGE_OFF)
    } else {
        (None, LE_PAGE_OFF)
    };
    let page = get_u32(buf, base).ok_or_else(|| bad("truncated"))?;
    let number = get_u32(buf, base + 4).ok_or_else(|| bad("truncated"))?;
    let len = get_u16(buf, base + 8).ok_or_else(|| bad("truncated"))?;
    let hdr = base + 10;

    let (value, body) = if len == NULL_ATTR_LEN {
        (None, 0)
    } else {
        let len = usize::from(len);
        let v = buf.get(hdr..hdr + len).ok_or_else(|| bad("value shorter than declared"))?;
        (Some(v), len)
    };
    let consumed = roundup8(hdr + body).min(buf.len());
    Ok((
        ListEntry {
            oid,
            page,
            number,
            value,
        },
        consumed,
    ))
}

/// Writes the 8-byte attribute list header.
pub fn write_list_header(buf: &mut [u8], list_type: u8, entries_len: u32) -> Result<(), OsdError> {
    put(buf, 0, &[list_type & 0x0F, 0, 0, 0])?;
    put_u32(buf, 4, entries_len)
}

/// Reads an attribute list header, returning the list type and entry bytes.
pub fn read_list_header(buf: &[u8]) -> Result<(u8, usize), OsdError> {
    let ty = buf
        .first()
        .map(|b| b & 0x0F)
        .ok_or_else(|| OsdError::InvalidParameterList("missing list header".into()))?;
    let len = get_u32(buf, 4)
        .ok_or_else(|| OsdError::InvalidParameterList("missing list header".into()))?;
    Ok((ty, len as usize))
}

/// Iterates the entries of a set-attributes list body.
pub struct Entries<'a> {
    rest: &'a [u8],
    multi: bool,
}

impl<'a> Entries<'a> {
    pub fn new(body: &'a [u8], multi: bool) -> Self {
        Self { rest: body, multi }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<ListEntry<'a>, OsdError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        match unpack_attr(self.rest, self.multi) {
            Ok((entry, used)) => {
                self.rest = self.rest.get(used..).unwrap_or_default();
                Some(Ok(entry))
            }
            Err(e) => {
                self.rest = &[];
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_entry_round_trips_padded() {
        let mut buf = [0xEEu8; 64];
        let n = pack_attr(&mut buf, EntryFormat::Simple, 0x10000, 7, Some(b"hello")).unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf[..4], &0x10000u32.to_be_bytes());
        assert_eq!(&buf[8..10], &5u16.to_be_bytes());
        assert_eq!(&buf[15..16], &[0]);
        assert_eq!(buf[16], 0xEE);

        let (e, used) = unpack_attr(&buf[..n], false).unwrap();
        assert_eq!(used, 16);
        assert_eq!((e.page, e.number, e.value), (0x10000, 7, Some(&b"hello"[..])));
    }

    #[test]
    fn record_lengths_are_multiples_of_eight() {
        let mut buf = [0u8; 128];
        for len in 0..40usize {
            let value = vec![0xA5; len];
            let n = pack_attr(&mut buf, EntryFormat::Simple, 1, 1, Some(&value)).unwrap();
            assert_eq!(n % 8, 0, "len {len}");
            let n = pack_attr(&mut buf, EntryFormat::MultiObject(9), 1, 1, Some(&value)).unwrap();
            assert_eq!(n % 8, 0, "len {len}");
        }
    }

    #[test]
    fn multi_object_entry_carries_oid() {
        let mut buf = [0u8; 32];
        let n = pack_attr(&mut buf, EntryFormat::MultiObject(0x10005), 2, 3, Some(&[1, 2]))
            .unwrap();
        assert_eq!(n, 24);
        let (e, _) = unpack_attr(&buf, true).unwrap();
        assert_eq!(e.oid, Some(0x10005));
        assert_eq!(e.value, Some(&[1u8, 2][..]));
    }

    #[test]
    fn header_that_does_not_fit_is_overflow() {
        let mut buf = [0x55u8; LE_VAL_OFF - 1];
        assert!(matches!(
            pack_attr(&mut buf, EntryFormat::Simple, 1, 1, Some(b"x")),
            Err(OsdError::Overflow)
        ));
        assert!(buf.iter().all(|b| *b == 0x55));
    }

    #[test]
    fn truncated_value_keeps_declared_length() {
        let mut buf = [0u8; LE_VAL_OFF + 3];
        let n = pack_attr(&mut buf, EntryFormat::Simple, 1, 1, Some(b"abcdefgh")).unwrap();
        assert_eq!(n, LE_VAL_OFF + 3);
        assert_eq!(&buf[8..10], &8u16.to_be_bytes());
        assert_eq!(&buf[10..], b"abc");
        assert!(!fits(EntryFormat::Simple, 8, buf.len()));
    }

    #[test]
    fn undefined_value_writes_sentinel_and_no_bytes() {
        let mut buf = [0xFFu8; 16];
        let n = pack_attr(&mut buf, EntryFormat::Simple, 4, 5, None).unwrap();
        assert_eq!(n, 16);
        assert_eq!(&buf[8..10], &NULL_ATTR_LEN.to_be_bytes());
        let (e, _) = unpack_attr(&buf, false).unwrap();
        assert_eq!(e.value, None);
    }

    #[test]
    fn entries_iterator_walks_padded_records() {
        let mut buf = [0u8; 64];
        let a = pack_attr(&mut buf, EntryFormat::Simple, 1, 1, Some(b"one")).unwrap();
        let b = pack_attr(&mut buf[a..], EntryFormat::Simple, 1, 2, Some(b"second!!")).unwrap();
        let got: Vec<_> = Entries::new(&buf[..a + b], false)
            .map(|e| e.unwrap().number)
            .collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn short_value_in_list_is_rejected() {
        let mut buf = [0u8; 12];
        buf[9] = 20;
        assert!(matches!(
            unpack_attr(&buf, false),
            Err(OsdError::InvalidParameterList(_))
        ));
    }

    #[test]
    fn list_header_round_trip() {
        let mut buf = [0u8; 8];
        write_list_header(&mut buf, RTRVD_SET_ATTR_LIST, 48).unwrap();
        assert_eq!(read_list_header(&buf).unwrap(), (RTRVD_SET_ATTR_LIST, 48));
    }
}
