//! closed aggregator configuration record
//!
//! Every field is enumerated here with its stated default; nothing is
//! read from an implicit environment or inferred from a config object's
//! shape.

use siaac_intent::PrivacyLevel;

#[derive(Clone, Copy, Debug)]
pub struct AggregatorConfig {
    pub batch_max_size: usize,
    pub batch_max_wait_ms: u64,
    pub batch_min_size: usize,
    pub flush_tick_ms: u64,
    pub executor_timeout_ms: u64,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub privacy_level_default: PrivacyLevel,
    pub anonymity_pool_depth: usize,
    pub root_window: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_max_size: 100,
            batch_max_wait_ms: 60_000,
            batch_min_size: 1,
            flush_tick_ms: 1_000,
            executor_timeout_ms: 30_000,
            retry_base_ms: 1_000,
            retry_cap_ms: 60_000,
            privacy_level_default: PrivacyLevel::Shielded,
            anonymity_pool_depth: 20,
            root_window: 32,
        }
    }
}
