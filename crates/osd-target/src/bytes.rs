// Path: crates/osd-target/src/bytes.rs
//! Checked big-endian field access over wire buffers.

use osd_types::OsdError;

pub fn get_u16(buf: &[u8], off: usize) -> Option<u16> {
    let b = buf.get(off..off.checked_add(2)?)?;
    Some(u16::from_be_bytes(b.try_into().ok()?))
}

pub fn get_u32(buf: &[u8], off: usize) -> Option<u32> {
    let b = buf.get(off..off.checked_add(4)?)?;
    Some(u32::from_be_bytes(b.try_into().ok()?))
}

pub fn get_u64(buf: &[u8], off: usize) -> Option<u64> {
    let b = buf.get(off..off.checked_add(8)?)?;
    Some(u64::from_be_bytes(b.try_into().ok()?))
}

pub fn put(buf: &mut [u8], off: usize, src: &[u8]) -> Result<(), OsdError> {
    let end = off.checked_add(src.len()).ok_or(OsdError::Overflow)?;
    buf.get_mut(off..end)
        .ok_or(OsdError::Overflow)?
        .copy_from_slice(src);
    Ok(())
}

pub fn put_u8(buf: &mut [u8], off: usize, v: u8) -> Result<(), OsdError> {
    put(buf, off, &[v])
}

pub fn put_u16(buf: &mut [u8], off: usize, v: u16) -> Result<(), OsdError> {
    put(buf, off, &v.to_be_bytes())
}

pub fn put_u32(buf: &mut [u8], off: usize, v: u32) -> Result<(), OsdError> {
    put(buf, off, &v.to_be_bytes())
}

pub fn put_u64(buf: &mut [u8], off: usize, v: u64) -> Result<(), OsdError> {
    put(buf, off, &v.to_be_bytes())
}

/// Rounds `n` up to the next multiple of 8.
pub fn roundup8(n: usize) -> usize {
    (n + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_access_is_checked() {
        let mut buf = [0u8; 6];
        assert!(put_u32(&mut buf, 2, 0xAABBCCDD).is_ok());
        assert_eq!(get_u32(&buf, 2), Some(0xAABBCCDD));
        assert!(matches!(put_u32(&mut buf, 3, 1), Err(OsdError::Overflow)));
        assert_eq!(get_u64(&buf, 0), None);
        assert_eq!(get_u16(&buf, usize::MAX), None);
    }

    #[test]
    fn roundup() {
        assert_eq!(roundup8(0), 0);
        assert_eq!(roundup8(10), 16);
        assert_eq!(roundup8(16), 16);
    }
}
