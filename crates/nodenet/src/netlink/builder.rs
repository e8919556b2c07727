//! Request assembly.

use zerocopy::{Immutable, IntoBytes};

use super::attr::NlAttr;
use super::message::{NlMsgHdr, align4};

/// Accumulates one netlink request: header, family header, attributes.
///
/// The length field is filled in by [`finish`](Self::finish); sequence
/// number and port ID by [`stamp`](Self::stamp) just before sending.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    header: NlMsgHdr,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            header: NlMsgHdr::new(msg_type, flags),
            body: Vec::with_capacity(64),
        }
    }

    fn pad(&mut self) {
        self.body.resize(align4(self.body.len()), 0);
    }

    /// Append a fixed-size family header (rtmsg, fib_rule_hdr).
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.body.extend_from_slice(data.as_bytes());
        self.pad();
    }

    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) {
        self.body
            .extend_from_slice(NlAttr::new(attr_type, data.len()).as_bytes());
        self.body.extend_from_slice(data);
        self.pad();
    }

    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) {
        self.append_attr(attr_type, &value.to_ne_bytes());
    }

    /// Interface names and other strings travel NUL-terminated.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.append_attr(attr_type, &data);
    }

    pub fn stamp(&mut self, seq: u32, pid: u32) {
        self.header.nlmsg_seq = seq;
        self.header.nlmsg_pid = pid;
    }

    pub fn finish(mut self) -> Vec<u8> {
        let header_len = self.header.as_bytes().len();
        self.header.nlmsg_len = (header_len + self.body.len()) as u32;
        let mut msg = Vec::with_capacity(self.header.nlmsg_len as usize);
        msg.extend_from_slice(self.header.as_bytes());
        msg.append(&mut self.body);
        msg
    }
}
