//! Route attributes (struct rtattr): a 4-byte length/type header followed by
//! the payload, padded to 4 bytes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::message::align4;

/// Size of [`NlAttr`].
pub const NLA_HDRLEN: usize = 4;

/// High type bits carrying the NESTED and NET_BYTEORDER flags.
const NLA_FLAGS: u16 = 0xc000;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Header plus unpadded payload.
    pub nla_len: u16,
    pub nla_type: u16,
}

impl NlAttr {
    pub fn new(attr_type: u16, payload_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + payload_len) as u16,
            nla_type: attr_type,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }
}

/// Walks the attributes of one message body, yielding `(type, payload)`
/// with the flag bits stripped from the type.
///
/// A malformed length ends the walk; whatever follows cannot be located.
pub struct AttrIter<'a> {
    rest: &'a [u8],
}

impl<'a> AttrIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (attr, _) = NlAttr::read_from_prefix(self.rest).ok()?;
        let len = attr.nla_len as usize;
        if !(NLA_HDRLEN..=self.rest.len()).contains(&len) {
            self.rest = &[];
            return None;
        }

        let (current, rest) = self.rest.split_at(len);
        self.rest = rest.get(align4(len) - len..).unwrap_or_default();
        Some((attr.nla_type & !NLA_FLAGS, &current[NLA_HDRLEN..]))
    }
}

pub fn get_u32(data: &[u8]) -> Option<u32> {
    data.get(..4)?.try_into().ok().map(u32::from_ne_bytes)
}

/// String payloads are NUL-terminated; a missing terminator is tolerated.
pub fn get_string(data: &[u8]) -> Option<String> {
    let text = data.split(|&b| b == 0).next()?;
    std::str::from_utf8(text).ok().map(str::to_owned)
}

/// Address payload for the `AF_*` family in the message header.
pub fn get_ip_addr(data: &[u8], family: u8) -> Option<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => {
            let octets: [u8; 4] = data.get(..4)?.try_into().ok()?;
            Some(Ipv4Addr::from(octets).into())
        }
        libc::AF_INET6 => {
            let octets: [u8; 16] = data.get(..16)?.try_into().ok()?;
            Some(Ipv6Addr::from(octets).into())
        }
        _ => None,
    }
}
