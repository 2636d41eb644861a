// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Data Models
//!
//! Records shared between the onboarding flow and the collaborator clients.
//! All wire-facing types derive `Serialize`/`Deserialize`; the relay speaks
//! camelCase JSON, so relay-backed records carry the matching rename.
//!
//! ## Lifetime of these values
//!
//! Everything here lives in memory only. The identity token, session
//! credentials, and signed-message results are never written to disk and do
//! not survive a host reload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identity Token
// =============================================================================

/// Opaque bearer credential obtained from the identity provider's redirect
/// callback.
///
/// The flow never inspects the token's contents; it is handed verbatim to the
/// relay and the signing network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityToken(pub String);

impl IdentityToken {
    /// Borrow the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityToken {
    fn from(value: String) -> Self {
        IdentityToken(value)
    }
}

impl From<&str> for IdentityToken {
    fn from(value: &str) -> Self {
        IdentityToken(value.to_string())
    }
}

// =============================================================================
// Programmable Key Pair
// =============================================================================

/// A programmable key pair (PKP) minted or fetched through the relay.
///
/// The private half is held in threshold-shared form by the signing network;
/// this record only carries the public identifiers. Immutable once minted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PkpRecord {
    /// Token id of the PKP NFT on the network's registry.
    pub token_id: String,
    /// Ethereum-style address derived from the PKP's public key.
    pub eth_address: String,
    /// Uncompressed secp256k1 public key, hex encoded.
    pub public_key: String,
}

impl PkpRecord {
    /// Case-insensitive address comparison.
    ///
    /// Addresses circulate in mixed EIP-55 checksummed and lowercase forms;
    /// equality must ignore case.
    pub fn address_matches(&self, other: &str) -> bool {
        self.eth_address.eq_ignore_ascii_case(other)
    }
}

// =============================================================================
// Session Credentials
// =============================================================================

/// A single node's authorization signature over the delegated session key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    /// The signature produced by the node.
    pub sig: String,
    /// How the signature was derived (e.g. `session-key-delegation`).
    pub derived_via: String,
    /// The exact message that was signed.
    pub signed_message: String,
    /// Address of the signing node.
    pub address: String,
}

/// Delegated, time-bounded signing authorization for one PKP.
///
/// Issued by the signing network during session creation. Scoped to the
/// resources requested at creation time and unusable past `expiration`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    /// Public identifier of the ephemeral session key.
    pub session_key: String,
    /// Per-node delegation signatures, keyed by node address.
    pub signatures: BTreeMap<String, AuthSig>,
    /// RFC 3339 expiration supplied by the network.
    pub expiration: String,
}

/// A session bound to its PKP.
///
/// Credentials are only meaningful together with the key pair they were
/// scoped to, so the two are stored as one unit and never separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PkpSession {
    /// The key pair the session is scoped to.
    pub pkp: PkpRecord,
    /// The delegated credentials.
    pub credentials: SessionCredentials,
}

// =============================================================================
// Signed Message Result
// =============================================================================

/// Outcome of one signing attempt.
///
/// Derived data: recomputed per attempt, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    /// The plaintext that was signed.
    pub message: String,
    /// Canonical 65-byte ECDSA signature, 0x-prefixed hex.
    pub signature: String,
    /// Address recovered locally from `(message, signature)`.
    pub recovered_address: String,
    /// Whether the recovered address matches the signing PKP's address,
    /// compared case-insensitively.
    pub verified: bool,
}
