//! Routing policy rules over rtnetlink.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tracing::{debug, trace};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get_ip_addr, get_string, get_u32};
use super::builder::MessageBuilder;
use super::connection::Connection;
use super::message::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, NlMsgType};
use crate::error::{Error, Result};
use crate::host::RuleTable;
use crate::types::{AddressFamily, Rule, RuleAction, rt_table};

/// FIB rule header (struct fib_rule_hdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FibRuleHdr {
    pub family: u8,
    pub dst_len: u8,
    pub src_len: u8,
    pub tos: u8,
    pub table: u8,
    pub res1: u8,
    pub res2: u8,
    /// FR_ACT_*
    pub action: u8,
    pub flags: u32,
}

impl FibRuleHdr {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Attribute IDs for FRA_* constants.
mod attr_ids {
    pub const FRA_DST: u16 = 1;
    pub const FRA_SRC: u16 = 2;
    pub const FRA_IIFNAME: u16 = 3;
    pub const FRA_PRIORITY: u16 = 6;
    pub const FRA_FWMARK: u16 = 10;
    pub const FRA_TABLE: u16 = 15;
    pub const FRA_FWMASK: u16 = 16;
    pub const FRA_SUPPRESS_IFGROUP: u16 = 13;
    pub const FRA_SUPPRESS_PREFIXLEN: u16 = 14;
    pub const FRA_OIFNAME: u16 = 17;
    pub const FRA_PAD: u16 = 18;
    pub const FRA_PROTOCOL: u16 = 21;
}

use attr_ids::*;

/// `not` in front of the selectors.
const FIB_RULE_INVERT: u32 = 0x02;

/// Interface names including the trailing NUL.
const IFNAMSIZ: usize = 16;

/// "Unset" value the kernel reports for the suppress_* attributes.
const SUPPRESS_UNSET: u32 = u32::MAX;

fn check_ifname(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= IFNAMSIZ || name.contains('\0') {
        return Err(Error::InvalidMessage(format!(
            "invalid interface name {name:?}: must be 1 to {} bytes",
            IFNAMSIZ - 1
        )));
    }
    Ok(())
}

/// Build an RTM_NEWRULE or RTM_DELRULE request.
fn build_rule(rule: &Rule, msg_type: u16) -> Result<MessageBuilder> {
    for name in [&rule.iif, &rule.oif].into_iter().flatten() {
        check_ifname(name)?;
    }

    let mut flags = NLM_F_REQUEST | NLM_F_ACK;
    if msg_type == NlMsgType::RTM_NEWRULE {
        flags |= NLM_F_CREATE | NLM_F_EXCL;
    }

    let mut builder = MessageBuilder::new(msg_type, flags);

    let hdr = FibRuleHdr {
        family: rule.family.as_u8(),
        src_len: rule.src.map_or(0, |n| n.prefix()),
        dst_len: rule.dst.map_or(0, |n| n.prefix()),
        tos: rule.tos,
        action: rule.action.as_u8(),
        table: if rule.table <= 255 {
            rule.table as u8
        } else {
            rt_table::UNSPEC as u8
        },
        flags: if rule.invert { FIB_RULE_INVERT } else { 0 },
        ..Default::default()
    };
    builder.append(&hdr);

    if let Some(prio) = rule.priority {
        builder.append_attr_u32(FRA_PRIORITY, prio);
    }
    if let Some(src) = rule.src {
        append_addr(&mut builder, FRA_SRC, src);
    }
    if let Some(dst) = rule.dst {
        append_addr(&mut builder, FRA_DST, dst);
    }
    if let Some(ref iif) = rule.iif {
        builder.append_attr_str(FRA_IIFNAME, iif);
    }
    if let Some(ref oif) = rule.oif {
        builder.append_attr_str(FRA_OIFNAME, oif);
    }
    if let Some(mark) = rule.fwmark {
        builder.append_attr_u32(FRA_FWMARK, mark);
        if let Some(mask) = rule.fwmask {
            builder.append_attr_u32(FRA_FWMASK, mask);
        }
    }
    if rule.table > 255 {
        builder.append_attr_u32(FRA_TABLE, rule.table);
    }

    Ok(builder)
}

fn append_addr(builder: &mut MessageBuilder, attr: u16, net: IpNetwork) {
    match net.network() {
        IpAddr::V4(v4) => builder.append_attr(attr, &v4.octets()),
        IpAddr::V6(v6) => builder.append_attr(attr, &v6.octets()),
    }
}

/// Parse the payload of one RTM_NEWRULE dump message.
///
/// Returns `Ok(None)` for rules of a family or action the reconciler does not
/// model, and for rules carrying any selector it does not model (ipproto,
/// port or uid ranges, goto targets, l3mdev, realms, ...). Such a rule can
/// never be one this crate installed, so it is never counted or deleted.
pub fn parse_rule(payload: &[u8]) -> Result<Option<Rule>> {
    let (hdr, attrs) = FibRuleHdr::read_from_prefix(payload).map_err(|_| Error::Truncated {
        expected: FibRuleHdr::SIZE,
        actual: payload.len(),
    })?;

    let (Some(family), Some(action)) = (
        AddressFamily::from_u8(hdr.family),
        RuleAction::from_u8(hdr.action),
    ) else {
        return Ok(None);
    };

    let mut rule = Rule::new(family).action(action);
    rule.table = hdr.table as u32;
    rule.tos = hdr.tos;
    rule.invert = hdr.flags & FIB_RULE_INVERT != 0;

    for (kind, data) in AttrIter::new(attrs) {
        match kind {
            FRA_PRIORITY => rule.priority = get_u32(data),
            FRA_SRC => rule.src = prefix(data, hdr.family, hdr.src_len)?,
            FRA_DST => rule.dst = prefix(data, hdr.family, hdr.dst_len)?,
            FRA_IIFNAME => rule.iif = get_string(data),
            FRA_OIFNAME => rule.oif = get_string(data),
            FRA_FWMARK => rule.fwmark = get_u32(data),
            FRA_FWMASK => rule.fwmask = get_u32(data),
            FRA_TABLE => {
                if let Some(table) = get_u32(data) {
                    rule.table = table;
                }
            }
            FRA_SUPPRESS_PREFIXLEN | FRA_SUPPRESS_IFGROUP => {
                if get_u32(data) != Some(SUPPRESS_UNSET) {
                    return Ok(None);
                }
            }
            FRA_PROTOCOL | FRA_PAD => {}
            other => {
                trace!(attr = other, "skipping rule with unmodelled selector");
                return Ok(None);
            }
        }
    }

    // The kernel reports FRA_FWMASK as 0 alongside a zero mark.
    if rule.fwmark == Some(0) && rule.fwmask.unwrap_or(0) == 0 {
        rule.fwmark = None;
        rule.fwmask = None;
    }

    Ok(Some(rule))
}

fn prefix(data: &[u8], family: u8, len: u8) -> Result<Option<IpNetwork>> {
    let Some(addr) = get_ip_addr(data, family) else {
        return Ok(None);
    };
    IpNetwork::new(addr, len)
        .map(Some)
        .map_err(|e| Error::InvalidMessage(format!("bad rule prefix {addr}/{len}: {e}")))
}

impl RuleTable for Connection {
    fn add_rule(&self, rule: &Rule) -> Result<()> {
        debug!(%rule, "adding ip rule");
        self.request_ack(build_rule(rule, NlMsgType::RTM_NEWRULE)?)
            .map_err(|e| e.with_context(format!("add rule {rule}")))
    }

    fn del_rule(&self, rule: &Rule) -> Result<()> {
        debug!(%rule, "deleting ip rule");
        self.request_ack(build_rule(rule, NlMsgType::RTM_DELRULE)?)
            .map_err(|e| e.with_context(format!("delete rule {rule}")))
    }

    fn list_rules(&self, family: AddressFamily) -> Result<Vec<Rule>> {
        let mut builder = MessageBuilder::new(NlMsgType::RTM_GETRULE, NLM_F_REQUEST | NLM_F_DUMP);
        builder.append(&FibRuleHdr {
            family: family.as_u8(),
            ..Default::default()
        });

        let mut rules = Vec::new();
        for payload in self.dump(builder)? {
            if let Some(rule) = parse_rule(&payload)?
                && rule.family == family
            {
                rules.push(rule);
            }
        }
        Ok(rules)
    }
}
