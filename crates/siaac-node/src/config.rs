//! closed node configuration: CLI flags, with an optional TOML file
//! overlay layered on top of the built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use siaac_aggregator::AggregatorConfig;
use siaac_intent::PrivacyLevel;
use siaac_pool::AnonymityPoolConfig;

use crate::error::NodeError;

#[derive(Parser)]
#[command(name = "siaac-node")]
#[command(about = "Shielded Intent Authorization & Aggregation Core operator node")]
#[command(version)]
pub struct Args {
    /// port to listen on
    #[arg(short, long, default_value = "4400")]
    pub port: u16,

    /// bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: String,

    /// data directory (default: ~/.siaac-node)
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// prometheus metrics port (default: api port + 1000)
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// optional TOML config file overlaying the aggregator/pool defaults
    #[arg(long)]
    pub config: Option<String>,

    /// default chain tag used when a submitted intent carries no
    /// `targetChainHint`
    #[arg(long, default_value = "ethereum")]
    pub default_chain: String,
}

/// the subset of `AggregatorConfig`/`AnonymityPoolConfig` an operator may
/// override from a TOML file.
/// Every field is optional in the file; absent fields keep the built-in
/// default.
#[derive(Default, Deserialize, Serialize)]
pub struct FileOverlay {
    pub batch_max_size: Option<usize>,
    pub batch_max_wait_ms: Option<u64>,
    pub batch_min_size: Option<usize>,
    pub flush_tick_ms: Option<u64>,
    pub executor_timeout_ms: Option<u64>,
    pub retry_base_ms: Option<u64>,
    pub retry_cap_ms: Option<u64>,
    pub privacy_level_default: Option<String>,
    pub anonymity_pool_depth: Option<usize>,
    pub root_window: Option<usize>,
}

pub struct NodeConfig {
    pub aggregator: AggregatorConfig,
    pub anonymity_pool: AnonymityPoolConfig,
    pub default_chain: String,
}

fn parse_privacy_level(s: &str) -> Result<PrivacyLevel, NodeError> {
    match s.to_ascii_uppercase().as_str() {
        "TRANSPARENT" => Ok(PrivacyLevel::Transparent),
        "SHIELDED" => Ok(PrivacyLevel::Shielded),
        "COMPLIANT" => Ok(PrivacyLevel::Compliant),
        other => Err(NodeError::InvalidConfig(format!("unknown privacy_level_default: {other}"))),
    }
}

impl NodeConfig {
    /// build the closed config record from defaults, an optional TOML
    /// overlay, and CLI flags, in that precedence order (CLI highest).
    pub fn load(args: &Args) -> Result<Self, NodeError> {
        let mut aggregator = AggregatorConfig::default();
        let mut anonymity_pool = AnonymityPoolConfig::default();

        if let Some(path) = &args.config {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| NodeError::InvalidConfig(format!("reading {path}: {e}")))?;
            let overlay: FileOverlay = toml::from_str(&raw)
                .map_err(|e| NodeError::InvalidConfig(format!("parsing {path}: {e}")))?;
            apply_overlay(&mut aggregator, &mut anonymity_pool, &overlay)?;
        }

        if aggregator.batch_min_size == 0 {
            return Err(NodeError::InvalidConfig("batch_min_size must be at least 1".to_string()));
        }
        if aggregator.batch_min_size > aggregator.batch_max_size {
            return Err(NodeError::InvalidConfig("batch_min_size must not exceed batch_max_size".to_string()));
        }
        if anonymity_pool.depth == 0 || anonymity_pool.depth > 64 {
            return Err(NodeError::InvalidConfig("anonymity_pool_depth must be in 1..=64".to_string()));
        }

        Ok(Self { aggregator, anonymity_pool, default_chain: args.default_chain.clone() })
    }
}

fn apply_overlay(
    aggregator: &mut AggregatorConfig,
    anonymity_pool: &mut AnonymityPoolConfig,
    overlay: &FileOverlay,
) -> Result<(), NodeError> {
    if let Some(v) = overlay.batch_max_size {
        aggregator.batch_max_size = v;
    }
    if let Some(v) = overlay.batch_max_wait_ms {
        aggregator.batch_max_wait_ms = v;
    }
    if let Some(v) = overlay.batch_min_size {
        aggregator.batch_min_size = v;
    }
    if let Some(v) = overlay.flush_tick_ms {
        aggregator.flush_tick_ms = v;
    }
    if let Some(v) = overlay.executor_timeout_ms {
        aggregator.executor_timeout_ms = v;
    }
    if let Some(v) = overlay.retry_base_ms {
        aggregator.retry_base_ms = v;
    }
    if let Some(v) = overlay.retry_cap_ms {
        aggregator.retry_cap_ms = v;
    }
    if let Some(s) = &overlay.privacy_level_default {
        aggregator.privacy_level_default = parse_privacy_level(s)?;
    }
    if let Some(v) = overlay.anonymity_pool_depth {
        aggregator.anonymity_pool_depth = v;
        anonymity_pool.depth = v;
    }
    if let Some(v) = overlay.root_window {
        aggregator.root_window = v;
        anonymity_pool.root_window = v;
    }
    Ok(())
}
