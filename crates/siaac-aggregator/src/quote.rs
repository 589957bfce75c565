//! quote-solver interface consumed by the quote-integrated submission path
//!
//! A quote is advisory only: [`Aggregator::submit_intent`] never consults
//! it and authorization never bypasses it. The interface exists so a
//! deployment can shop a `QuoteRequest` to one or more external solver
//! networks before a sender builds and signs its intent; nothing here
//! participates in the authorize/enqueue/flush path itself.

/// a request for advisory pricing on a prospective transfer. Mirrors the
/// fields of `RawIntent` a sender would go on to build, minus anything
/// that would require the sender to have already committed to one.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuoteRequest {
    pub src_chain: String,
    pub dst_chain: String,
    pub asset: String,
    pub amount: u128,
}

/// one solver's advisory price for a [`QuoteRequest`]. `expires_at` is a
/// millisecond unix timestamp; callers MUST treat a quote as stale past
/// that point rather than inferring freshness from round-trip latency.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SolverQuote {
    pub solver_id: String,
    pub quoted_amount_out: u128,
    pub expires_at: u64,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote solver unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("quote solver call timed out")]
    Timeout,
}

impl QuoteError {
    /// stable machine-readable code for the wire layer, mirroring
    /// `siaac_auth::Error::code`.
    pub fn code(&self) -> &'static str {
        match self {
            QuoteError::Unreachable { .. } => "QUOTE_SOLVER_UNREACHABLE",
            QuoteError::Timeout => "QUOTE_SOLVER_TIMEOUT",
        }
    }
}

/// external quote-solver network. Implementations are consumed, not
/// owned: the aggregator holds at most a shared handle and never lets a
/// solver's response influence whether an intent is authorized.
#[async_trait::async_trait]
pub trait QuoteSolver: Send + Sync {
    async fn get_quotes(&self, request: &QuoteRequest) -> Result<Vec<SolverQuote>, QuoteError>;
}

/// solver with no network behind it: always returns zero quotes. Used
/// where no quote-solver network is configured so the quote-integrated
/// path degrades to "no advisory pricing available" rather than panicking
/// or silently fabricating a price.
pub struct NullQuoteSolver;

#[async_trait::async_trait]
impl QuoteSolver for NullQuoteSolver {
    async fn get_quotes(&self, _request: &QuoteRequest) -> Result<Vec<SolverQuote>, QuoteError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_solver_returns_no_quotes() {
        let solver = NullQuoteSolver;
        let req = QuoteRequest {
            src_chain: "ethereum".to_string(),
            dst_chain: "solana".to_string(),
            asset: "0x0".to_string(),
            amount: 1,
        };
        let quotes = solver.get_quotes(&req).await.unwrap();
        assert!(quotes.is_empty());
    }
}
