//! Request/response handling over a route netlink socket.

use tracing::trace;

use super::builder::MessageBuilder;
use super::message::{MessageIter, error_code};
use super::socket::NetlinkSocket;
use crate::error::{Error, Result};

/// Blocking rtnetlink connection.
///
/// Every call sends one request and waits for the kernel's answer; there is
/// no pipelining. Route and rule operations live in the `route` and `rule`
/// modules as [`RouteTable`](crate::host::RouteTable) and
/// [`RuleTable`](crate::host::RuleTable) implementations.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Send a request that expects an ACK only (no data response).
    pub fn request_ack(&self, mut builder: MessageBuilder) -> Result<()> {
        let seq = self.socket.next_seq();
        builder.stamp(seq, self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg)?;

        loop {
            let response = self.socket.recv_msg()?;
            if let Some(result) = process_ack(&response, seq) {
                return result;
            }
            trace!(seq, "skipping unrelated netlink datagram");
        }
    }

    /// Send a dump request and collect the payload of every reply message.
    pub fn dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.stamp(seq, self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg)?;

        let mut payloads = Vec::new();
        loop {
            let data = self.socket.recv_msg()?;
            if collect_dump(&data, seq, &mut payloads)? {
                return Ok(payloads);
            }
        }
    }
}

/// Look for the ACK for `seq` in a datagram.
///
/// Returns `None` if the datagram carries no answer for this request.
fn process_ack(data: &[u8], seq: u32) -> Option<Result<()>> {
    for result in MessageIter::new(data) {
        let (header, payload) = match result {
            Ok(msg) => msg,
            Err(e) => return Some(Err(e)),
        };

        if header.nlmsg_seq != seq || !header.is_error() {
            continue;
        }

        return Some(match error_code(payload) {
            Ok(0) => Ok(()),
            Ok(errno) => Err(Error::from_errno(errno)),
            Err(e) => Err(e),
        });
    }
    None
}

/// Append the dump replies for `seq` found in a datagram.
///
/// Returns `true` once the terminating DONE message has been seen.
fn collect_dump(data: &[u8], seq: u32, payloads: &mut Vec<Vec<u8>>) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            return match error_code(payload)? {
                0 => Ok(true),
                errno => Err(Error::from_errno(errno)),
            };
        }

        if header.is_done() {
            return Ok(true);
        }

        payloads.push(payload.to_vec());
    }
    Ok(false)
}
