use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use keystone_wallet_encoder::{merkle_proof_bytes, SessionTree};
use keystone_wallet_types::{SessionLeaf, UserOperation};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod leaves;

use leaves::LeafSpec;

/// Session tree and operation hash tooling for Keystone wallets.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct LeafArgs {
    /// JSON array of leaves (`validUntil`, `validAfter`, `validator`, `config`).
    #[arg(long)]
    leaves: Option<PathBuf>,

    /// Compact leaf `validUntil:validAfter:validator:0xconfig`. Repeatable; appended after `--leaves`.
    #[arg(long = "leaf")]
    leaf: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the tree and emit its root with every leaf's proof.
    Build {
        #[command(flatten)]
        input: LeafArgs,

        /// Write the report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Emit the proof for one leaf.
    Prove {
        #[command(flatten)]
        input: LeafArgs,

        #[arg(long)]
        index: usize,
    },
    /// Hash a JSON user operation for a given entry point and chain.
    OpHash {
        /// JSON user operation (camelCase fields, hex quantities).
        #[arg(long)]
        op: PathBuf,

        #[arg(long, env = "CHAIN_ID")]
        chain_id: u64,

        #[arg(long, env = "ENTRY_POINT")]
        entry_point: Address,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build { input, out } => {
            let leaves = leaves::load(input.leaves.as_deref(), &input.leaf)?;
            let report = tree_report(&leaves, &timestamp())?;
            match out {
                Some(path) => {
                    write_json_atomic(&path, &report)?;
                    info!(path = %path.display(), leaves = leaves.len(), "tree written");
                }
                None => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Command::Prove { input, index } => {
            let leaves = leaves::load(input.leaves.as_deref(), &input.leaf)?;
            let report = proof_report(&leaves, index)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::OpHash {
            op,
            chain_id,
            entry_point,
        } => {
            let hash = op_hash(&op, entry_point, chain_id)?;
            println!("{hash}");
        }
    }
    Ok(())
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

fn tree_report(leaves: &[SessionLeaf], generated_at: &str) -> Result<Value> {
    let tree = SessionTree::from_leaves(leaves);
    let mut entries = Vec::with_capacity(leaves.len());
    for (index, leaf) in leaves.iter().enumerate() {
        if leaf.is_unbounded() {
            debug!(index, "leaf has no time bounds");
        }
        let proof = tree
            .proof(index)
            .ok_or_else(|| anyhow!("no proof for leaf {index}"))?;
        let mut entry = serde_json::to_value(LeafSpec::from(leaf))?;
        entry["index"] = json!(index);
        entry["digest"] = json!(leaf.digest());
        entry["proof"] = json!(proof);
        entries.push(entry);
    }
    Ok(json!({
        "root": tree.root(),
        "generated_at": generated_at,
        "leaves": entries,
    }))
}

fn proof_report(leaves: &[SessionLeaf], index: usize) -> Result<Value> {
    let tree = SessionTree::from_leaves(leaves);
    let proof = tree
        .proof(index)
        .ok_or_else(|| anyhow!("leaf index {index} out of range ({} leaves)", leaves.len()))?;
    Ok(json!({
        "root": tree.root(),
        "index": index,
        "digest": leaves[index].digest(),
        "proof": proof,
        "proofBytes": merkle_proof_bytes(&proof),
    }))
}

fn op_hash(path: &Path, entry_point: Address, chain_id: u64) -> Result<B256> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let op: UserOperation = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing user operation in {}", path.display()))?;
    Ok(op.hash(entry_point, chain_id))
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised = serde_json::to_string_pretty(value).context("failed serialising tree JSON")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
