//! Packet-filter chain integration tests.

use nodenet::Result;
use nodenet::config::{ChainRuleConfig, Ensure};
use nodenet::host::SystemHost;
use nodenet::types::{ChainSpec, RuleSpec};

use crate::common::TestNamespace;

fn accept_from(dev: &str) -> RuleSpec {
    RuleSpec::new(["-i", dev, "-j", "ACCEPT"])
}

#[test]
fn test_owned_chain_lifecycle() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("chainown")?;
    let config = ChainRuleConfig::new(
        ChainSpec::owned("filter", "NODENET-FWD"),
        vec![accept_from("cbr0"), accept_from("eth0")],
    );

    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, true)?;
        config.ensure(&host, true)
    })?;
    let listing = ns.chain("filter", "NODENET-FWD").expect("chain exists");
    assert_eq!(listing.matches("-A NODENET-FWD").count(), 2, "{listing}");

    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, false)?;
        config.ensure(&host, false)
    })?;
    assert!(ns.chain("filter", "NODENET-FWD").is_none());

    Ok(())
}

#[test]
fn test_builtin_chain_keeps_foreign_rules() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("chainbuiltin")?;
    ns.exec("iptables", &["-w", "-t", "filter", "-A", "FORWARD", "-i", "lo", "-j", "DROP"])?;

    let config = ChainRuleConfig::new(
        ChainSpec::system_default("filter", "FORWARD"),
        vec![accept_from("cbr0")],
    );

    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, true)?;
        config.ensure(&host, true)
    })?;
    let listing = ns.chain("filter", "FORWARD").expect("built-in chain");
    assert_eq!(listing.matches("-i cbr0 -j ACCEPT").count(), 1, "{listing}");

    ns.run(|| {
        let host = SystemHost::new()?;
        config.ensure(&host, false)?;
        config.ensure(&host, false)
    })?;
    let listing = ns.chain("filter", "FORWARD").expect("built-in chain survives");
    assert!(!listing.contains("cbr0"), "{listing}");
    assert!(listing.contains("-i lo -j DROP"), "{listing}");

    Ok(())
}
