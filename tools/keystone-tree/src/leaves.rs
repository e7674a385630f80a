//! Session leaf input: a JSON file of leaves, or compact `--leaf` arguments.

use std::{fs, path::Path};

use alloy_primitives::{Address, Bytes};
use anyhow::{anyhow, Context, Result};
use keystone_wallet_types::{BoundOutOfRange, SessionLeaf};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// JSON form of a session leaf.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeafSpec {
    #[serde(default)]
    pub valid_until: u64,
    #[serde(default)]
    pub valid_after: u64,
    pub validator: Address,
    #[serde(default)]
    pub config: Bytes,
}

impl TryFrom<LeafSpec> for SessionLeaf {
    type Error = BoundOutOfRange;

    fn try_from(entry: LeafSpec) -> Result<Self, Self::Error> {
        SessionLeaf::new(entry.valid_until, entry.valid_after, entry.validator, entry.config)
    }
}

impl From<&SessionLeaf> for LeafSpec {
    fn from(leaf: &SessionLeaf) -> Self {
        Self {
            valid_until: leaf.valid_until(),
            valid_after: leaf.valid_after(),
            validator: leaf.validator,
            config: leaf.config.clone(),
        }
    }
}

/// Parse `validUntil:validAfter:validator:config`, e.g. `1700000000:0:0xabc..:0x1234`.
pub fn parse_compact(arg: &str) -> Result<SessionLeaf> {
    let re = Regex::new(r"^(\d+):(\d+):(0x[a-fA-F0-9]{40}):(0x(?:[a-fA-F0-9]{2})*)$")?;
    let caps = re
        .captures(arg.trim())
        .ok_or_else(|| anyhow!("malformed --leaf `{arg}`: expected validUntil:validAfter:validator:0xconfig"))?;
    let valid_until: u64 = caps[1].parse().context("validUntil does not fit in 48 bits")?;
    let valid_after: u64 = caps[2].parse().context("validAfter does not fit in 48 bits")?;
    let validator: Address = caps[3].parse().context("bad validator address")?;
    let config: Bytes = caps[4].parse().context("bad config hex")?;
    Ok(SessionLeaf::new(valid_until, valid_after, validator, config)?)
}

/// Leaves from a JSON array file followed by the compact arguments, in that order.
pub fn load(file: Option<&Path>, compact: &[String]) -> Result<Vec<SessionLeaf>> {
    let mut leaves = Vec::new();
    if let Some(path) = file {
        let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
        let entries: Vec<LeafSpec> = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing leaves JSON in {}", path.display()))?;
        for (i, entry) in entries.into_iter().enumerate() {
            let leaf = SessionLeaf::try_from(entry).with_context(|| format!("leaf {i} in {}", path.display()))?;
            leaves.push(leaf);
        }
    }
    for arg in compact {
        leaves.push(parse_compact(arg)?);
    }
    if leaves.is_empty() {
        return Err(anyhow!("no session leaves: pass --leaves <file> or --leaf <until:after:validator:config>"));
    }
    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_leaf_parses() {
        let leaf = parse_compact("100:5:0x00000000000000000000000000000000000000aa:0x0102").unwrap();
        assert_eq!(leaf.valid_until(), 100);
        assert_eq!(leaf.valid_after(), 5);
        assert_eq!(leaf.validator, Address::with_last_byte(0xaa));
        assert_eq!(leaf.config, Bytes::from(vec![1u8, 2]));
    }

    #[test]
    fn compact_leaf_rejects_garbage() {
        assert!(parse_compact("100:5:0xaa:0x01").is_err());
        assert!(parse_compact("100:5:0x00000000000000000000000000000000000000aa:0x012").is_err());
        assert!(parse_compact("281474976710656:0:0x00000000000000000000000000000000000000aa:0x").is_err());
    }

    #[test]
    fn json_leaf_defaults_bounds() {
        let entry: LeafSpec =
            serde_json::from_str(r#"{"validator":"0x00000000000000000000000000000000000000bb"}"#).unwrap();
        let leaf = SessionLeaf::try_from(entry).unwrap();
        assert!(leaf.is_unbounded());
        assert!(leaf.config.is_empty());
    }

    #[test]
    fn json_leaf_rejects_wide_bounds() {
        let entry: LeafSpec = serde_json::from_str(
            r#"{"validUntil":281474976710656,"validator":"0x00000000000000000000000000000000000000bb"}"#,
        )
        .unwrap();
        assert_eq!(SessionLeaf::try_from(entry), Err(BoundOutOfRange(1 << 48)));
    }
}
