//! Route management over rtnetlink.

use std::ffi::CString;
use std::net::IpAddr;

use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::builder::MessageBuilder;
use super::connection::Connection;
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType};
use crate::error::{Error, Result};
use crate::host::RouteTable;
use crate::types::{Route, rt_table};

/// Routing message header (struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    pub rtm_family: u8,
    pub rtm_dst_len: u8,
    pub rtm_src_len: u8,
    pub rtm_tos: u8,
    pub rtm_table: u8,
    pub rtm_protocol: u8,
    pub rtm_scope: u8,
    pub rtm_type: u8,
    pub rtm_flags: u32,
}

/// Route attributes (RTA_*).
mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
    pub const TABLE: u16 = 15;
}

/// RTPROT_BOOT: installed by the administrator rather than a routing daemon.
const RTPROT_BOOT: u8 = 3;
/// RTN_UNICAST
const RTN_UNICAST: u8 = 1;

/// Resolve an interface name to its index in the caller's network namespace.
fn ifname_to_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| Error::InvalidMessage(format!("invalid interface name: {name:?}")))?;
    // SAFETY: c_name is a valid NUL-terminated string that outlives the call.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(Error::InterfaceNotFound {
            name: name.to_string(),
        });
    }
    Ok(index)
}

fn table_byte(table: u32) -> u8 {
    if table > 255 {
        rt_table::UNSPEC as u8
    } else {
        table as u8
    }
}

fn append_common(builder: &mut MessageBuilder, route: &Route, oif: Option<u32>) {
    match route.dst.network() {
        IpAddr::V4(v4) if route.dst.prefix() > 0 => builder.append_attr(rta::DST, &v4.octets()),
        IpAddr::V6(v6) if route.dst.prefix() > 0 => builder.append_attr(rta::DST, &v6.octets()),
        _ => {}
    }
    match route.gateway {
        Some(IpAddr::V4(gw)) => builder.append_attr(rta::GATEWAY, &gw.octets()),
        Some(IpAddr::V6(gw)) => builder.append_attr(rta::GATEWAY, &gw.octets()),
        None => {}
    }
    if let Some(index) = oif {
        builder.append_attr_u32(rta::OIF, index);
    }
    if route.table > 255 {
        builder.append_attr_u32(rta::TABLE, route.table);
    }
}

/// Build an RTM_NEWROUTE request. `oif` is the resolved index of `route.dev`.
fn build_add(route: &Route, oif: Option<u32>) -> MessageBuilder {
    let mut builder = MessageBuilder::new(
        NlMsgType::RTM_NEWROUTE,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    );
    builder.append(&RtMsg {
        rtm_family: route.family().as_u8(),
        rtm_dst_len: route.dst.prefix(),
        rtm_table: table_byte(route.table),
        rtm_protocol: RTPROT_BOOT,
        rtm_scope: route.effective_scope().as_u8(),
        rtm_type: RTN_UNICAST,
        ..Default::default()
    });
    append_common(&mut builder, route, oif);
    builder
}

/// Build an RTM_DELROUTE request matching the route's gateway and device.
fn build_delete(route: &Route, oif: Option<u32>) -> MessageBuilder {
    let mut builder = MessageBuilder::new(NlMsgType::RTM_DELROUTE, NLM_F_REQUEST | NLM_F_ACK);
    builder.append(&RtMsg {
        rtm_family: route.family().as_u8(),
        rtm_dst_len: route.dst.prefix(),
        rtm_table: table_byte(route.table),
        // RT_SCOPE_NOWHERE matches any scope on delete.
        rtm_scope: 255,
        ..Default::default()
    });
    append_common(&mut builder, route, oif);
    builder
}

impl RouteTable for Connection {
    fn add_route(&self, route: &Route) -> Result<()> {
        debug!(%route, "adding route");
        let oif = route.dev.as_deref().map(ifname_to_index).transpose()?;
        self.request_ack(build_add(route, oif))
            .map_err(|e| e.with_context(format!("add route {route}")))
    }

    fn del_route(&self, route: &Route) -> Result<()> {
        debug!(%route, "deleting route");
        // A vanished device means the kernel already dropped its routes.
        let oif = route.dev.as_deref().map(ifname_to_index).transpose()?;
        self.request_ack(build_delete(route, oif))
            .map_err(|e| e.with_context(format!("delete route {route}")))
    }
}
