//! Error types and user-facing transaction failure messages.

use std::fmt;
use std::time::Duration;

use alloy::primitives::{B256, TxHash};

/// Convenience alias used across the crate.
pub type Result<T, E = MarketError> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to the marketplace.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// A contract view call failed.
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    /// The JSON-RPC transport returned an error.
    #[error("rpc error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    /// An RPC request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The node does not know the transaction.
    #[error("transaction {0} not found")]
    TransactionNotFound(TxHash),

    /// The node does not know the block.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// The node returned no block for the `latest` tag.
    #[error("node returned no latest block")]
    NoLatestBlock,

    /// A log did not match the marketplace ABI.
    #[error("malformed log: {0}")]
    Decode(#[from] alloy::sol_types::Error),

    /// A log carried a topic that is not a marketplace event.
    #[error("unknown event signature {0}")]
    UnknownEvent(B256),

    /// A submitted transaction failed, with a human-readable reason.
    #[error("{0}")]
    Transaction(TxFailure),
}

/// Wrap a future in the per-request timeout.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| MarketError::Timeout(limit))?
}

/// Short, human-readable classification of a failed transaction.
///
/// Provider and wallet errors arrive as free-form strings; this maps the
/// well-known codes and substrings onto messages suitable for end users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFailure {
    /// The user declined the request in their wallet.
    Rejected,
    /// The account cannot cover value plus gas.
    InsufficientFunds,
    /// The contract reverted, with its reason string when available.
    Reverted(Option<String>),
    /// The nonce was already used.
    NonceTooLow,
    /// A transaction with the same nonce is already pending.
    AlreadyPending,
    /// The node could not be reached or did not answer.
    Network,
    /// Anything else, truncated for display.
    Other(String),
}

/// Longest raw message kept in [`TxFailure::Other`].
const MAX_RAW_MESSAGE: usize = 120;

impl TxFailure {
    /// Classify a provider error message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("action_rejected")
            || lower.contains("code 4001")
            || lower.contains("code: 4001")
        {
            Self::Rejected
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds
        } else if let Some(idx) = lower.find("execution reverted") {
            Self::Reverted(
                message
                    .get(idx + "execution reverted".len()..)
                    .and_then(revert_reason),
            )
        } else if lower.contains("nonce too low") {
            Self::NonceTooLow
        } else if lower.contains("already known") || lower.contains("replacement transaction underpriced") {
            Self::AlreadyPending
        } else if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection")
            || lower.contains("network error")
        {
            Self::Network
        } else {
            Self::Other(message.chars().take(MAX_RAW_MESSAGE).collect())
        }
    }
}

/// Extract the reason from the tail following `execution reverted`.
fn revert_reason(tail: &str) -> Option<String> {
    let reason = tail
        .trim_start_matches([':', ' '])
        .split([',', '\n'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');
    (!reason.is_empty()).then(|| reason.to_owned())
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("Transaction rejected in wallet"),
            Self::InsufficientFunds => f.write_str("Insufficient funds for amount plus gas"),
            Self::Reverted(Some(reason)) => write!(f, "Transaction reverted: {reason}"),
            Self::Reverted(None) => f.write_str("Transaction reverted by the contract"),
            Self::NonceTooLow => f.write_str("Nonce already used, refresh your wallet and retry"),
            Self::AlreadyPending => f.write_str("A transaction is already pending"),
            Self::Network => f.write_str("Network error, please try again"),
            Self::Other(raw) => write!(f, "Transaction failed: {raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_rejections() {
        for msg in [
            "MetaMask Tx Signature: User denied transaction signature.",
            "server returned an error response: error code 4001: User rejected the request.",
            "ACTION_REJECTED",
        ] {
            assert_eq!(TxFailure::classify(msg), TxFailure::Rejected, "{msg}");
        }
    }

    #[test]
    fn revert_reasons_are_extracted() {
        let failure = TxFailure::classify(
            "server returned an error response: error code 3: execution reverted: Bid too low, data: \"0x08c3\"",
        );
        assert_eq!(failure, TxFailure::Reverted(Some("Bid too low".to_owned())), "reason");
        assert_eq!(failure.to_string(), "Transaction reverted: Bid too low", "display");

        assert_eq!(
            TxFailure::classify("execution reverted"),
            TxFailure::Reverted(None),
            "bare revert"
        );
    }

    #[test]
    fn common_provider_errors() {
        assert_eq!(
            TxFailure::classify("insufficient funds for gas * price + value"),
            TxFailure::InsufficientFunds,
            "funds"
        );
        assert_eq!(TxFailure::classify("nonce too low"), TxFailure::NonceTooLow, "nonce");
        assert_eq!(
            TxFailure::classify("replacement transaction underpriced"),
            TxFailure::AlreadyPending,
            "replacement"
        );
        assert_eq!(TxFailure::classify("request timed out"), TxFailure::Network, "timeout");
    }

    #[test]
    fn unknown_messages_are_truncated() {
        let long = "x".repeat(500);
        let TxFailure::Other(raw) = TxFailure::classify(&long) else {
            panic!("expected Other");
        };
        assert_eq!(raw.len(), MAX_RAW_MESSAGE, "truncated");
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let limit = Duration::from_millis(5);
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        assert!(
            matches!(with_timeout(limit, slow).await, Err(MarketError::Timeout(d)) if d == limit),
            "timeout error"
        );
    }
}
