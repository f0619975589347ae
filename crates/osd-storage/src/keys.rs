// Path: crates/osd-storage/src/keys.rs
//! Prefix-encoded keys. Big-endian fields keep redb's byte order equal to
//! numeric order, so every enumeration is a contiguous range scan.

use osd_api::storage::{be32, be64, StorageError};

pub fn k_object(pid: u64, oid: u64) -> Vec<u8> {
    [be64(pid).as_slice(), be64(oid).as_slice()].concat()
}

pub fn k_attr(pid: u64, oid: u64, page: u32, number: u32) -> Vec<u8> {
    [
        be64(pid).as_slice(),
        be64(oid).as_slice(),
        be32(page).as_slice(),
        be32(number).as_slice(),
    ]
    .concat()
}

/// MEMBERS is keyed `[pid][cid][oid][number]`, MEMBER_OF `[pid][oid][cid][number]`.
/// The number is part of the key so one object may sit in the same
/// collection through several collection-page slots.
pub fn k_member(pid: u64, first: u64, second: u64, number: u32) -> Vec<u8> {
    [
        be64(pid).as_slice(),
        be64(first).as_slice(),
        be64(second).as_slice(),
        be32(number).as_slice(),
    ]
    .concat()
}

pub fn read_u64(bytes: &[u8], at: usize) -> Result<u64, StorageError> {
    bytes
        .get(at..at + 8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| StorageError::Decode(format!("short key: {} bytes", bytes.len())))
}

pub fn read_u32(bytes: &[u8], at: usize) -> Result<u32, StorageError> {
    bytes
        .get(at..at + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| StorageError::Decode(format!("short key: {} bytes", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_keys_order_by_page_then_number() {
        let a = k_attr(1, 2, 3, 0xFFFF_FFFF);
        let b = k_attr(1, 2, 4, 0);
        assert!(a < b);
        assert_eq!(a.len(), 24);
        assert_eq!(read_u32(&a, 16).unwrap(), 3);
        assert_eq!(read_u64(&a, 8).unwrap(), 2);
    }

    #[test]
    fn member_keys_group_slots_under_one_pair() {
        let a = k_member(1, 2, 3, u32::MAX);
        let b = k_member(1, 2, 4, 0);
        assert!(a < b);
        assert!(k_member(1, 2, 3, 1) < k_member(1, 2, 3, 2));
        assert_eq!(a.len(), 28);
        assert_eq!(read_u64(&a, 16).unwrap(), 3);
        assert_eq!(read_u32(&a, 24).unwrap(), u32::MAX);
    }

    #[test]
    fn short_keys_fail_to_decode() {
        assert!(matches!(read_u64(&[0u8; 4], 0), Err(StorageError::Decode(_))));
    }
}
