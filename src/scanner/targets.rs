//! Target-list grammar: hostnames, IP literals, and IPv4 CIDR blocks

use std::collections::HashSet;
use std::io::BufRead;
use std::net::Ipv4Addr;

use anyhow::{bail, Context, Result};

/// Largest CIDR block the expander will accept.
const MAX_CIDR_HOSTS: u64 = 1 << 20;

/// Read one target token per line: a hostname, an IP literal, or an IPv4
/// CIDR block. Blank lines are skipped, CIDR blocks expand to every address
/// they contain, and duplicates are dropped keeping first-seen order.
pub fn parse_targets<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading target list")?;
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let expanded =
            expand_target(token).with_context(|| format!("invalid target {token:?}"))?;
        for target in expanded {
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
    }
    Ok(targets)
}

fn expand_target(token: &str) -> Result<Vec<String>> {
    if !token.contains('/') {
        return Ok(vec![token.to_string()]);
    }
    expand_cidr(token)
}

/// Expand an IPv4 CIDR block to every address in it, network and broadcast
/// included. Blocks larger than 2^20 addresses are rejected.
pub fn expand_cidr(block: &str) -> Result<Vec<String>> {
    let (addr_part, prefix_part) = block
        .split_once('/')
        .context("missing prefix length")?;
    let base: Ipv4Addr = addr_part
        .parse()
        .context("not an IPv4 network address")?;
    let prefix: u8 = prefix_part.parse().context("bad prefix length")?;
    if prefix > 32 {
        bail!("prefix length /{prefix} out of range");
    }

    let count = 1u64 << (32 - prefix);
    if count > MAX_CIDR_HOSTS {
        bail!("CIDR block too large: {count} addresses");
    }

    let network = u32::from(base) & (u32::MAX << (32 - prefix));
    Ok((0..count)
        .map(|i| Ipv4Addr::from(network + i as u32).to_string())
        .collect())
}
