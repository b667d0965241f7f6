//! Pre-configured Shardeum network definitions.
//!
//! Marketplace contracts are deployed per environment and are supplied by
//! the caller, so a [`Network`] only carries chain-level metadata.

/// Known networks hosting a `.shm` domain marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Network {
    /// Shardeum Mainnet (chain ID 8118).
    ShardeumMainnet,
    /// Shardeum EVM Testnet (chain ID 8083).
    ShardeumTestnet,
    /// Local development chain such as anvil (chain ID 31337).
    Localhost,
}

impl Network {
    /// All known network variants.
    pub const ALL: &[Self] = &[Self::ShardeumMainnet, Self::ShardeumTestnet, Self::Localhost];

    /// Returns the EIP-155 chain ID for this network.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::ShardeumMainnet => 8118,
            Self::ShardeumTestnet => 8083,
            Self::Localhost => 31337,
        }
    }

    /// Suggested public RPC endpoint.
    #[must_use]
    pub const fn default_rpc(self) -> &'static str {
        match self {
            Self::ShardeumMainnet => "https://api.shardeum.org",
            Self::ShardeumTestnet => "https://api-testnet.shardeum.org",
            Self::Localhost => "http://127.0.0.1:8545",
        }
    }

    /// Ticker of the native token used for prices and bids.
    #[must_use]
    pub const fn native_symbol(self) -> &'static str {
        match self {
            Self::ShardeumMainnet | Self::ShardeumTestnet => "SHM",
            Self::Localhost => "ETH",
        }
    }

    /// Whether this is a test or development network.
    #[must_use]
    pub const fn is_testnet(self) -> bool {
        !matches!(self, Self::ShardeumMainnet)
    }

    /// Look up a [`Network`] by its EIP-155 chain ID.
    ///
    /// Returns [`None`] if the chain ID is not a known deployment.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|n| n.chain_id() == chain_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_round_trip() {
        for network in Network::ALL {
            assert_eq!(
                Network::from_chain_id(network.chain_id()),
                Some(*network),
                "lookup by chain id"
            );
        }
        assert_eq!(Network::from_chain_id(1), None, "ethereum is not listed");
    }

    #[test]
    fn only_mainnet_is_production() {
        assert!(!Network::ShardeumMainnet.is_testnet(), "mainnet");
        assert!(Network::ShardeumTestnet.is_testnet(), "testnet");
        assert_eq!(Network::ShardeumMainnet.native_symbol(), "SHM", "symbol");
    }
}
