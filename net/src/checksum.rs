//! Byte-order accessors and the one's-complement Internet checksum.
//!
//! Every multi-byte wire field is read and written through the `get_be*` /
//! `put_be*` helpers, so nothing depends on host byte order or on in-memory
//! struct layout. Reads past the end of a slice return 0 and writes past the
//! end are ignored; callers check lengths before trusting a value.

use crate::types::Ipv4Addr;

// =============================================================================
// Byte order
// =============================================================================

#[inline]
pub fn get_be16(buf: &[u8], off: usize) -> u16 {
    match buf.get(off..off + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => 0,
    }
}

#[inline]
pub fn get_be32(buf: &[u8], off: usize) -> u32 {
    match buf.get(off..off + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

#[inline]
pub fn put_be16(buf: &mut [u8], off: usize, val: u16) {
    if let Some(b) = buf.get_mut(off..off + 2) {
        b.copy_from_slice(&val.to_be_bytes());
    }
}

#[inline]
pub fn put_be32(buf: &mut [u8], off: usize, val: u32) {
    if let Some(b) = buf.get_mut(off..off + 4) {
        b.copy_from_slice(&val.to_be_bytes());
    }
}

/// Copy `src` into `buf` at `off`, returning the number of bytes written.
#[inline]
pub fn put_bytes(buf: &mut [u8], off: usize, src: &[u8]) -> usize {
    match buf.get_mut(off..off + src.len()) {
        Some(b) => {
            b.copy_from_slice(src);
            src.len()
        }
        None => 0,
    }
}

// =============================================================================
// One's-complement sum
// =============================================================================

/// Add `data` to a running one's-complement sum.
///
/// Big-endian 16-bit words, a trailing odd byte counts as the high byte of a
/// zero-padded word, and every carry out of bit 15 is folded back in.
/// The result is the raw sum, not its complement.
pub fn add_csum(sum: u16, data: &[u8]) -> u16 {
    let mut acc = sum as u32;
    let mut words = data.chunks_exact(2);
    for w in &mut words {
        acc += u16::from_be_bytes([w[0], w[1]]) as u32;
        acc = (acc & 0xffff) + (acc >> 16);
    }
    if let [last] = words.remainder() {
        acc += (*last as u32) << 8;
        acc = (acc & 0xffff) + (acc >> 16);
    }
    acc as u16
}

/// Add one 16-bit word to a running sum with end-around carry.
#[inline]
pub fn add_word(sum: u16, word: u16) -> u16 {
    let acc = sum as u32 + word as u32;
    ((acc & 0xffff) + (acc >> 16)) as u16
}

/// Internet checksum of `data`: the complement of its one's-complement sum.
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    !add_csum(0, data)
}

/// A block carrying its own checksum sums to all-ones (or to zero, the other
/// one's-complement representation of zero).
#[inline]
pub fn residual_ok(sum: u16) -> bool {
    sum == 0xffff || sum == 0x0000
}

/// Verify a block that includes its checksum field.
#[inline]
pub fn verify(data: &[u8]) -> bool {
    residual_ok(add_csum(0, data))
}

/// Sum of the UDP/TCP pseudo-header: addresses, zero, protocol, length.
pub fn pseudo_header_sum(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, len: u16) -> u16 {
    let mut ph = [0u8; 12];
    ph[0..4].copy_from_slice(&src.0);
    ph[4..8].copy_from_slice(&dst.0);
    ph[9] = proto;
    ph[10..12].copy_from_slice(&len.to_be_bytes());
    add_csum(0, &ph)
}

/// Checksum for a transport segment (header with zero checksum field, plus data).
pub fn transport_checksum(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, segment: &[u8]) -> u16 {
    let sum = pseudo_header_sum(src, dst, proto, segment.len() as u16);
    !add_csum(sum, segment)
}

/// Verify a received transport segment against its pseudo-header.
pub fn transport_verify(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, segment: &[u8]) -> bool {
    let sum = pseudo_header_sum(src, dst, proto, segment.len() as u16);
    residual_ok(add_csum(sum, segment))
}

/// Adjust a stored checksum after one covered 16-bit word dropped by `delta`.
///
/// The new checksum is the old one plus `delta` in one's-complement
/// arithmetic (RFC 1624), no pass over the data needed.
#[inline]
pub fn adjust_for_decrease(check: u16, delta: u16) -> u16 {
    add_word(check, delta)
}
