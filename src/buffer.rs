//! Bounds-checked typed views over raw byte buffers.
//!
//! Every on-disk record in this crate is a `#[repr(C, packed)]` plain-old-data
//! struct, so a view is valid at any byte offset as long as it fits inside the
//! buffer. These helpers are the single place where that check happens.

use crate::error::{Result, VfsError};
use bytemuck::Pod;
use std::mem::size_of;

/// Check that `len` bytes starting at `offset` lie inside a buffer of `available` bytes.
pub fn check_range(offset: usize, len: usize, available: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(VfsError::OutOfBounds {
            offset,
            len,
            available,
        }),
    }
}

/// Borrow a single record of type `T` at `offset`.
pub fn interpret<T: Pod>(buffer: &[u8], offset: usize) -> Result<&T> {
    let len = size_of::<T>();
    check_range(offset, len, buffer.len())?;
    bytemuck::try_from_bytes(&buffer[offset..offset + len])
        .map_err(|err| VfsError::InvalidFormat(format!("unaligned record view: {err}")))
}

/// Borrow `count` consecutive records of type `T` starting at `offset`.
pub fn interpret_slice<T: Pod>(buffer: &[u8], offset: usize, count: usize) -> Result<&[T]> {
    let len = count.checked_mul(size_of::<T>()).ok_or(VfsError::OutOfBounds {
        offset,
        len: usize::MAX,
        available: buffer.len(),
    })?;
    check_range(offset, len, buffer.len())?;
    bytemuck::try_cast_slice(&buffer[offset..offset + len])
        .map_err(|err| VfsError::InvalidFormat(format!("unaligned record view: {err}")))
}

/// Copy a record out of the buffer, for types whose alignment is larger than 1.
pub fn read_pod<T: Pod>(buffer: &[u8], offset: usize) -> Result<T> {
    let len = size_of::<T>();
    check_range(offset, len, buffer.len())?;
    Ok(bytemuck::pod_read_unaligned(&buffer[offset..offset + len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Pod, Zeroable)]
    #[repr(C, packed)]
    struct Pair {
        a: u16,
        b: u32,
    }

    #[test]
    fn test_interpret_at_odd_offset() {
        let buf = [0xFF, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
        let pair: &Pair = interpret(&buf, 1).unwrap();
        let (a, b) = (pair.a, pair.b);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_interpret_out_of_bounds() {
        let buf = [0u8; 6];
        assert!(interpret::<Pair>(&buf, 0).is_ok());
        assert!(matches!(
            interpret::<Pair>(&buf, 1),
            Err(VfsError::OutOfBounds { offset: 1, len: 6, available: 6 })
        ));
    }

    #[test]
    fn test_interpret_slice_bounds() {
        let buf = [0u8; 13];
        assert_eq!(interpret_slice::<Pair>(&buf, 1, 2).unwrap().len(), 2);
        assert!(interpret_slice::<Pair>(&buf, 2, 2).is_err());
        assert!(interpret_slice::<Pair>(&buf, 0, usize::MAX).is_err());
        assert!(interpret_slice::<Pair>(&buf, usize::MAX, 1).is_err());
    }

    #[test]
    fn test_read_pod_unaligned() {
        let mut buf = vec![0u8; 9];
        buf[1..9].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(read_pod::<u64>(&buf, 1).unwrap(), 0x1122_3344_5566_7788);
        assert!(read_pod::<u64>(&buf, 2).is_err());
    }
}
