//! DNS stub resolver: wire codec and the single outstanding A query.
//!
//! Queries ask for one A record with recursion desired. Responses are
//! matched by id; compressed names are followed at most
//! [`MAX_POINTER_FOLLOWS`] times so a circular pointer cannot hang decode.

use tinyip_lib::klog_debug;

use crate::checksum::{get_be16, put_be16};
use crate::types::Ipv4Addr;

// =============================================================================
// Constants
// =============================================================================

pub const DNS_PORT: u16 = 53;
/// Local port the resolver sends from unless configured otherwise.
pub const DNS_DEFAULT_LOCAL_PORT: u16 = 49200;

const DNS_NAME_MAX: usize = 253;
const DNS_LABEL_MAX: usize = 63;
pub const DNS_HEADER_LEN: usize = 12;
pub const DNS_MAX_MESSAGE: usize = 512;
/// Compression pointers followed per name before giving up.
pub const MAX_POINTER_FOLLOWS: usize = 16;

const FLAG_QR: u16 = 0x8000;
const FLAG_RD: u16 = 0x0100;

pub const TYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;

// =============================================================================
// Header
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }

    fn write(&self, buf: &mut [u8]) {
        put_be16(buf, 0, self.id);
        put_be16(buf, 2, self.flags);
        put_be16(buf, 4, self.qdcount);
        put_be16(buf, 6, self.ancount);
        put_be16(buf, 8, self.nscount);
        put_be16(buf, 10, self.arcount);
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < DNS_HEADER_LEN {
            return None;
        }
        Some(Self {
            id: get_be16(buf, 0),
            flags: get_be16(buf, 2),
            qdcount: get_be16(buf, 4),
            ancount: get_be16(buf, 6),
            nscount: get_be16(buf, 8),
            arcount: get_be16(buf, 10),
        })
    }
}

// =============================================================================
// Names
// =============================================================================

/// Encode a dotted name as length-prefixed labels ending in a zero label.
///
/// A trailing dot is accepted. Returns the encoded length, or `None` for an
/// empty label, an oversized label or name, or a short buffer.
pub fn encode_name(name: &[u8], buf: &mut [u8]) -> Option<usize> {
    if name.len() > DNS_NAME_MAX {
        return None;
    }
    let name = name.strip_suffix(b".").unwrap_or(name);

    let mut pos = 0usize;
    if !name.is_empty() {
        for label in name.split(|&b| b == b'.') {
            if label.is_empty() || label.len() > DNS_LABEL_MAX {
                return None;
            }
            if pos + 1 + label.len() >= buf.len() {
                return None;
            }
            buf[pos] = label.len() as u8;
            buf[pos + 1..pos + 1 + label.len()].copy_from_slice(label);
            pos += 1 + label.len();
        }
    }

    *buf.get_mut(pos)? = 0;
    Some(pos + 1)
}

/// Decode the name at `offset` into dotted form.
///
/// Returns `(name_len, wire_len)`: the bytes written to `out` and the bytes
/// the name occupies at `offset` (a pointer counts as two).
pub fn decode_name(packet: &[u8], offset: usize, out: &mut [u8]) -> Option<(usize, usize)> {
    let mut pos = offset;
    let mut out_pos = 0usize;
    let mut wire_len = None;
    let mut follows = 0usize;

    loop {
        let b = *packet.get(pos)?;
        if b == 0 {
            let wire_len = wire_len.unwrap_or_else(|| pos + 1 - offset);
            return Some((out_pos, wire_len));
        }

        if b & 0xC0 == 0xC0 {
            let target = ((b as usize & 0x3F) << 8) | *packet.get(pos + 1)? as usize;
            if wire_len.is_none() {
                wire_len = Some(pos + 2 - offset);
            }
            follows += 1;
            if follows > MAX_POINTER_FOLLOWS || target >= packet.len() {
                return None;
            }
            pos = target;
            continue;
        }
        if b & 0xC0 != 0 {
            return None;
        }

        let label = packet.get(pos + 1..pos + 1 + b as usize)?;
        if out_pos > 0 {
            *out.get_mut(out_pos)? = b'.';
            out_pos += 1;
        }
        out.get_mut(out_pos..out_pos + label.len())?
            .copy_from_slice(label);
        out_pos += label.len();
        pos += 1 + label.len();
    }
}

/// Offset just past the name at `pos`, without following pointers.
pub fn skip_name(packet: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let b = *packet.get(pos)?;
        if b == 0 {
            return Some(pos + 1);
        }
        if b & 0xC0 == 0xC0 {
            packet.get(pos + 1)?;
            return Some(pos + 2);
        }
        if b & 0xC0 != 0 {
            return None;
        }
        pos += 1 + b as usize;
    }
}

// =============================================================================
// Query and records
// =============================================================================

/// Build an A/IN query for `name`. Returns the message length.
pub fn build_query(id: u16, name: &[u8], buf: &mut [u8]) -> Option<usize> {
    if buf.len() < DNS_HEADER_LEN {
        return None;
    }
    DnsHeader {
        id,
        flags: FLAG_RD,
        qdcount: 1,
        ..DnsHeader::default()
    }
    .write(buf);

    let q = DNS_HEADER_LEN + encode_name(name, &mut buf[DNS_HEADER_LEN..])?;
    if q + 4 > buf.len() {
        return None;
    }
    put_be16(buf, q, TYPE_A);
    put_be16(buf, q + 2, CLASS_IN);
    Some(q + 4)
}

/// A decoded resource record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DnsRecord {
    pub rtype: u16,
    pub class: u16,
    /// The record data as an address, when it is exactly four bytes.
    pub addr: Option<Ipv4Addr>,
    /// Offset of the next record.
    pub next: usize,
}

/// Decode the record at `offset`. With `answer` false only the question
/// fields (type and class) are read.
pub fn decode_record(packet: &[u8], offset: usize, answer: bool) -> Option<DnsRecord> {
    let pos = skip_name(packet, offset)?;
    packet.get(pos..pos + 4)?;
    let rtype = get_be16(packet, pos);
    let class = get_be16(packet, pos + 2);
    if !answer {
        return Some(DnsRecord {
            rtype,
            class,
            addr: None,
            next: pos + 4,
        });
    }

    // TTL is not used.
    let rdlen_at = pos + 8;
    packet.get(rdlen_at..rdlen_at + 2)?;
    let rdlength = get_be16(packet, rdlen_at) as usize;
    let data = packet.get(rdlen_at + 2..rdlen_at + 2 + rdlength)?;
    Some(DnsRecord {
        rtype,
        class,
        addr: (rdlength == 4).then(|| Ipv4Addr::read_from(data, 0)),
        next: rdlen_at + 2 + rdlength,
    })
}

// =============================================================================
// Resolver
// =============================================================================

/// One outstanding A query and its answer.
pub struct DnsResolver {
    port: u16,
    next_id: u16,
    outstanding: Option<u16>,
    answer: Option<Ipv4Addr>,
}

impl DnsResolver {
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            next_id: 1,
            outstanding: None,
            answer: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn answer(&self) -> Option<Ipv4Addr> {
        self.answer
    }

    /// Build the next query into `buf`, forgetting any previous answer.
    pub fn start_query(&mut self, name: &[u8], buf: &mut [u8]) -> Option<usize> {
        let id = self.next_id;
        let len = build_query(id, name, buf)?;
        self.next_id = self.next_id.wrapping_add(1);
        self.outstanding = Some(id);
        self.answer = None;
        klog_debug!("dns: query id {} ({} bytes)", id, len);
        Some(len)
    }

    /// Rebuild the outstanding query under its own id, so a late answer to an
    /// earlier copy still matches. Starts a new query if none is outstanding.
    pub fn retry_query(&mut self, name: &[u8], buf: &mut [u8]) -> Option<usize> {
        match self.outstanding {
            Some(id) => {
                let len = build_query(id, name, buf)?;
                klog_debug!("dns: resend id {}", id);
                Some(len)
            }
            None => self.start_query(name, buf),
        }
    }

    /// Take a response for the outstanding query. Returns the address once
    /// an A record with a four-byte address has been found.
    pub fn handle_response(&mut self, packet: &[u8]) -> Option<Ipv4Addr> {
        let header = DnsHeader::parse(packet)?;
        if !header.is_response() || self.outstanding != Some(header.id) {
            klog_debug!("dns: unexpected message id {}", header.id);
            return None;
        }
        self.outstanding = None;
        if header.rcode() != 0 {
            klog_debug!("dns: id {} rcode {}", header.id, header.rcode());
            return None;
        }

        let mut pos = DNS_HEADER_LEN;
        for _ in 0..header.qdcount {
            pos = decode_record(packet, pos, false)?.next;
        }
        for _ in 0..header.ancount {
            let rec = decode_record(packet, pos, true)?;
            if rec.rtype == TYPE_A {
                if let Some(addr) = rec.addr {
                    klog_debug!("dns: id {} -> {}", header.id, addr);
                    self.answer = Some(addr);
                    return Some(addr);
                }
            }
            pos = rec.next;
        }
        None
    }
}
