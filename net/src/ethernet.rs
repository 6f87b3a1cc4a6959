//! Ethernet II header construction.

use crate::checksum::{put_be16, put_bytes};
use crate::frame::ETH_HEADER_LEN;
use crate::types::{EtherType, MacAddr};

pub const ETH_ADDR_LEN: usize = 6;

/// Write an Ethernet header at the start of `buf`, returning its length.
pub fn add_eth(buf: &mut [u8], dst: MacAddr, src: MacAddr, ethertype: EtherType) -> usize {
    if buf.len() < ETH_HEADER_LEN {
        return 0;
    }
    put_bytes(buf, 0, &dst.0);
    put_bytes(buf, ETH_ADDR_LEN, &src.0);
    put_be16(buf, 2 * ETH_ADDR_LEN, ethertype.as_u16());
    ETH_HEADER_LEN
}
