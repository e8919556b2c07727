//! Netlink framing: the `nlmsghdr` header, the flags the reconciler sends
//! and a splitter for datagrams that carry several messages.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Round up to the 4-byte boundary both messages and attributes use.
#[inline]
pub const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Length of [`NlMsgHdr`] on the wire.
pub const NLMSG_HDRLEN: usize = align4(size_of::<NlMsgHdr>());

pub const NLM_F_REQUEST: u16 = 0x001;
pub const NLM_F_MULTI: u16 = 0x002;
pub const NLM_F_ACK: u16 = 0x004;
/// `NLM_F_ROOT | NLM_F_MATCH`: return every object of the requested kind.
pub const NLM_F_DUMP: u16 = 0x300;
/// Fail with EEXIST instead of replacing.
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;

/// Message types the reconciler sends or expects back.
pub struct NlMsgType;

impl NlMsgType {
    pub const ERROR: u16 = 2;
    pub const DONE: u16 = 3;
    pub const RTM_NEWROUTE: u16 = 24;
    pub const RTM_DELROUTE: u16 = 25;
    pub const RTM_NEWRULE: u16 = 32;
    pub const RTM_DELRULE: u16 = 33;
    pub const RTM_GETRULE: u16 = 34;
}

/// struct nlmsghdr
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Total length, header included.
    pub nlmsg_len: u32,
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    /// Port ID of the sender; 0 for the kernel.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    pub fn as_bytes(&self) -> &[u8] {
        IntoBytes::as_bytes(self)
    }

    /// Copy a header out of the front of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: data.len(),
            })
    }
}

/// Errno carried by an `NLMSG_ERROR` payload: 0 for an ACK, otherwise a
/// negative errno.
pub fn error_code(payload: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::Truncated {
            expected: 4,
            actual: payload.len(),
        })?;
    Ok(i32::from_ne_bytes(bytes))
}

/// Splits a received datagram into `(header, payload)` pairs.
///
/// A header whose length does not fit the remaining buffer ends the
/// iteration after yielding an error.
pub struct MessageIter<'a> {
    rest: &'a [u8],
}

impl<'a> MessageIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < NLMSG_HDRLEN {
            return None;
        }
        let header = match NlMsgHdr::from_bytes(self.rest) {
            Ok(header) => header,
            Err(e) => return Some(Err(e)),
        };

        let len = header.nlmsg_len as usize;
        if !(NLMSG_HDRLEN..=self.rest.len()).contains(&len) {
            self.rest = &[];
            return Some(Err(Error::InvalidMessage(format!(
                "netlink message length {len} out of bounds"
            ))));
        }

        let (message, rest) = self.rest.split_at(len);
        self.rest = rest.get(align4(len) - len..).unwrap_or_default();
        Some(Ok((header, &message[NLMSG_HDRLEN..])))
    }
}
