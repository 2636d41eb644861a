// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signing-Network Collaborator Contract
//!
//! Trait boundary to the distributed signing network that custodies PKP key
//! shares. The network owns all protocol specifics (node set, share
//! combination, transport); this module only fixes the call shapes the
//! onboarding flow depends on: connecting, signing a session key during
//! authorization, issuing delegated session credentials, and executing a
//! signing action under those credentials.
//!
//! Session authorization is callback-driven: the network calls back into the
//! flow with the chain, expiration, and resources it wants authorized, and
//! the flow answers with an [`AuthSig`] produced via [`SigningNetwork::sign_session_key`].

use std::future::Future;
use std::pin::Pin;

use alloy::primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{AuthSig, IdentityToken, PkpRecord, SessionCredentials};

/// Boxed future used by the authorization callback.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authorization callback passed into [`SigningNetwork::create_delegated_session`].
///
/// The network invokes it (possibly more than once) with the parameters it
/// wants authorized; the callback answers with a signed authorization.
pub type AuthNeededCallback<'a> =
    Box<dyn Fn(AuthCallbackParams) -> BoxFuture<'a, Result<AuthSig, SessionError>> + Send + Sync + 'a>;

/// Parameters the network hands to the authorization callback.
#[derive(Debug, Clone)]
pub struct AuthCallbackParams {
    /// Chain name the network wants the session authorized for.
    pub chain: String,
    /// Expiration window proposed by the network, RFC 3339.
    pub expiration: String,
    /// Resources the session will be scoped to.
    pub resources: Vec<String>,
}

/// Request to sign a delegated session key with a PKP-held auth method.
#[derive(Debug, Clone)]
pub struct SessionKeyRequest {
    /// Public key of the PKP the session is scoped to.
    pub public_key: String,
    /// Identity token backing the auth method.
    pub token: IdentityToken,
    /// Chain id resolved for the network's announced chain.
    pub chain_id: u64,
    /// Expiration window, RFC 3339.
    pub expiration: String,
    /// Resources the session will be scoped to.
    pub resources: Vec<String>,
}

/// Parameters for creating a delegated session.
#[derive(Debug)]
pub struct SessionParams<'a> {
    /// Key pair the session is scoped to.
    pub pkp: &'a PkpRecord,
    /// Identity token backing the auth method.
    pub token: &'a IdentityToken,
    /// Chain the host wants to operate on.
    pub chain: &'a str,
    /// Resources to request authorization for.
    pub resources: &'a [String],
    /// Requested expiration, RFC 3339.
    pub expiration: &'a str,
}

/// A signing action to execute under session credentials.
#[derive(Debug)]
pub struct SigningAction<'a> {
    /// Source of the delegated action program.
    pub code: &'a str,
    /// 32-byte digest to sign.
    pub to_sign: B256,
    /// Public key of the PKP that should sign.
    pub public_key: &'a str,
    /// Name under which the signature is returned.
    pub sig_name: &'a str,
}

/// Combined signature-share material returned by the network for one
/// signature name.
///
/// `r`/`s` are hex scalars (with or without a `0x` prefix); `recid` is the
/// recovery id, either 0/1 or the Ethereum legacy 27/28.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureShare {
    pub r: String,
    pub s: String,
    pub recid: u8,
}

/// Errors raised while connecting or establishing a delegated session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The network could not be reached.
    #[error("signing network unreachable: {0}")]
    Unreachable(String),

    /// The network rejected the credential request.
    #[error("signing network rejected the session request: {0}")]
    Rejected(String),

    /// The authorization callback failed to produce a valid authorization.
    #[error("session authorization failed: {0}")]
    Authorization(String),
}

/// Errors raised while executing a signing action.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The network failed to execute the action.
    #[error("signing action failed: {0}")]
    Execution(String),

    /// The returned share material could not be assembled into a signature.
    #[error("signature share was malformed: {0}")]
    MalformedShare(String),

    /// No address could be recovered from the assembled signature.
    #[error("could not recover signer from signature: {0}")]
    Recovery(String),
}

/// The distributed signing network, as seen by the onboarding flow.
#[async_trait]
pub trait SigningNetwork: Send + Sync {
    /// Establish the node connections needed to serve requests.
    ///
    /// Callers check [`SigningNetwork::ready`] first and reuse an existing
    /// connection when one is up.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Whether the client currently holds a usable connection.
    fn ready(&self) -> bool;

    /// Sign a delegated session key with the PKP-held auth method.
    ///
    /// Invoked from inside the authorization callback during session
    /// creation.
    async fn sign_session_key(&self, request: SessionKeyRequest) -> Result<AuthSig, SessionError>;

    /// Request delegated session credentials scoped to one PKP.
    ///
    /// The network drives `auth_needed` to obtain authorization and returns
    /// the credentials together with the expiration window it settled on.
    async fn create_delegated_session(
        &self,
        params: SessionParams<'_>,
        auth_needed: AuthNeededCallback<'_>,
    ) -> Result<SessionCredentials, SessionError>;

    /// Execute a signing action under the given credentials and return the
    /// combined share material for the requested signature name.
    async fn execute_signing_action(
        &self,
        action: SigningAction<'_>,
        credentials: &SessionCredentials,
    ) -> Result<SignatureShare, SigningError>;
}
