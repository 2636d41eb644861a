// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Known-chain registry backing the session authorization callback.

/// A chain the signing network may announce during session authorization.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain name as announced by the network
    pub name: &'static str,
    /// EVM chain ID
    pub chain_id: u64,
}

/// Ethereum mainnet.
pub const ETHEREUM: ChainConfig = ChainConfig {
    name: "ethereum",
    chain_id: 1,
};

/// Ethereum Goerli testnet.
pub const GOERLI: ChainConfig = ChainConfig {
    name: "goerli",
    chain_id: 5,
};

/// Polygon PoS.
pub const POLYGON: ChainConfig = ChainConfig {
    name: "polygon",
    chain_id: 137,
};

/// Avalanche C-Chain.
pub const AVALANCHE: ChainConfig = ChainConfig {
    name: "avalanche",
    chain_id: 43114,
};

/// Chains the registry knows about.
pub const KNOWN_CHAINS: &[ChainConfig] = &[ETHEREUM, GOERLI, POLYGON, AVALANCHE];

/// Chain id used when the announced chain is not in the registry.
pub const DEFAULT_CHAIN_ID: u64 = ETHEREUM.chain_id;

/// Look up the chain id for a chain name.
pub fn chain_id_for(name: &str) -> Option<u64> {
    KNOWN_CHAINS
        .iter()
        .find(|chain| chain.name.eq_ignore_ascii_case(name))
        .map(|chain| chain.chain_id)
}

/// Resolve a chain name to an id, falling back to [`DEFAULT_CHAIN_ID`] when
/// the name is unknown.
///
/// The session authorization callback depends on this fallback: the network
/// may announce a chain the registry has never heard of, and authorization
/// must still proceed on the default chain rather than fail.
pub fn resolve_chain_id(name: &str) -> u64 {
    chain_id_for(name).unwrap_or(DEFAULT_CHAIN_ID)
}
