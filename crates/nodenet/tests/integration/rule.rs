//! Policy rule integration tests.

use std::net::Ipv4Addr;

use nodenet::Result;
use nodenet::config::{Ensure, RuleConfig};
use nodenet::host::{RuleTable, SystemHost};
use nodenet::netlink::Connection;
use nodenet::node::local_table_rule;
use nodenet::types::{AddressFamily, Rule};

use crate::common::TestNamespace;

#[test]
fn test_dump_parses_added_rule() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("ruledump")?;
    ns.exec("ip", &["rule", "add", "prio", "30001", "iif", "cbr0", "lookup", "1"])?;

    let rules = ns.run(|| Connection::new()?.list_rules(AddressFamily::Inet))?;
    let wanted = Rule::v4().priority(30001).iif("cbr0").table(1);
    assert!(
        rules.iter().any(|r| *r == wanted),
        "rule not in dump: {rules:?}"
    );

    Ok(())
}

#[test]
fn test_add_and_delete_through_connection() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("ruleadd")?;
    let rule = local_table_rule(Ipv4Addr::new(10, 128, 0, 24));

    ns.run(|| {
        let conn = Connection::new()?;
        conn.add_rule(&rule)?;
        let err = conn.del_rule(&Rule::v4().priority(30000).iif("nope0").table(1));
        assert!(err.is_err_and(|e| e.is_not_found()));
        Ok(())
    })?;
    assert_eq!(ns.count_rules("10.128.0.24 lookup local")?, 1);

    ns.run(|| Connection::new()?.del_rule(&rule))?;
    assert_eq!(ns.count_rules("10.128.0.24")?, 0);

    Ok(())
}

#[test]
fn test_duplicates_collapse_to_one() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("ruledup")?;
    // Leftovers from older priority schemes next to the current one.
    for prio in ["100", "200", "30000"] {
        ns.exec(
            "ip",
            &["rule", "add", "prio", prio, "to", "10.128.0.24", "lookup", "local"],
        )?;
    }
    assert_eq!(ns.count_rules("10.128.0.24")?, 3);

    let config = RuleConfig::new(local_table_rule(Ipv4Addr::new(10, 128, 0, 24)));
    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, true)?;
        config.ensure(&host, true)
    })?;

    let rules = ns.rules()?;
    let matching: Vec<&str> = rules.lines().filter(|l| l.contains("10.128.0.24")).collect();
    assert_eq!(matching.len(), 1, "{rules}");
    assert!(matching[0].starts_with("30000:"), "{rules}");

    Ok(())
}

#[test]
fn test_disable_removes_every_instance() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("ruledel")?;
    let config = RuleConfig::new(Rule::v4().priority(30001).iif("cbr0").table(1));

    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, true)?;
        host.add_rule(&config.rule.clone().priority(200))?;
        config.ensure(&host, false)?;
        config.ensure(&host, false)
    })?;
    assert_eq!(ns.count_rules("iif cbr0")?, 0);

    Ok(())
}
