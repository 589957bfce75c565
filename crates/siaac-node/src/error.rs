//! operator-facing error taxonomy and process exit codes

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("persisted state version mismatch: expected {expected}, found {found}")]
    StateVersionMismatch { expected: u16, found: u16 },

    #[error("failed to read state file {path}: {source}")]
    StateRead { path: String, source: std::io::Error },

    #[error("failed to write state file {path}: {source}")]
    StateWrite { path: String, source: std::io::Error },

    #[error("corrupt persisted state: {0}")]
    StateCorrupt(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// process exit code for this failure: `2` invalid configuration,
    /// `4` internal state corruption detected by the importer, anything
    /// else falls back to `1`.
    ///
    /// `NodeError` only ever arises before the HTTP listener is bound
    /// (config load, data-dir/sled setup, state import) or on the final
    /// graceful-shutdown checkpoint, so it only ever covers that startup
    /// subset of exit codes. The remaining two codes named for a
    /// command-line variant — `3` invalid input/crypto failure, `5`
    /// executor unreachable after retry budget exhausted — describe
    /// per-request and per-batch conditions that a long-running daemon
    /// surfaces as an HTTP status plus a stable `code()` string (see
    /// `siaac_auth::Error::code`, `siaac_pool::Error::code`,
    /// `siaac_aggregator::Error::code`) rather than as a process exit.
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::InvalidConfig(_) => 2,
            NodeError::StateVersionMismatch { .. } | NodeError::StateCorrupt(_) => 4,
            _ => 1,
        }
    }
}
