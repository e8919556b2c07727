//! Blocking rtnetlink socket.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use crate::error::Result;

/// Receive buffer size; large enough for a full rule dump batch.
const RECV_BUF_SIZE: usize = 32768;

/// Route netlink socket.
pub struct NetlinkSocket {
    socket: Socket,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
}

impl NetlinkSocket {
    /// Open and bind a `NETLINK_ROUTE` socket.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Extended ACK gives better error messages; not every kernel has it.
        socket.set_ext_ack(true).ok();

        Ok(Self {
            socket,
            seq: AtomicU32::new(1),
            pid,
        })
    }

    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Send a message, blocking until the kernel takes it.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        self.socket.send(msg, 0)?;
        Ok(())
    }

    /// Receive one datagram, blocking until it arrives.
    pub fn recv_msg(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
        self.socket.recv(&mut buf, 0)?;
        Ok(buf.to_vec())
    }
}
