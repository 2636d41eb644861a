// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end onboarding flow scenarios against scripted collaborators.
//!
//! The relay is fully scripted; the signing network is backed by a real
//! local ECDSA signer so the signature shares, recovery, and verification
//! paths run for real.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::B256;
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use async_trait::async_trait;
use url::Url;

use antei_onboard::flow::{FlowConfig, FlowError, OnboardingFlow, View, ViewKind};
use antei_onboard::models::{
    AuthSig, IdentityToken, PkpRecord, SessionCredentials,
};
use antei_onboard::network::{
    AuthCallbackParams, AuthNeededCallback, SessionError, SessionKeyRequest, SessionParams,
    SignatureShare, SigningAction, SigningError, SigningNetwork,
};
use antei_onboard::relay::{MintRequestId, MintStatus, PollPolicy, Relay, RelayError};

// =============================================================================
// Scripted relay
// =============================================================================

#[derive(Default)]
struct ScriptedRelay {
    pkps: Vec<PkpRecord>,
    fetch_error: Option<String>,
    poll_script: Mutex<VecDeque<MintStatus>>,
    fetch_calls: AtomicU32,
    mint_calls: AtomicU32,
    poll_calls: AtomicU32,
}

impl ScriptedRelay {
    fn with_pkps(pkps: Vec<PkpRecord>) -> Self {
        Self {
            pkps,
            ..Default::default()
        }
    }

    fn with_poll_script(script: Vec<MintStatus>) -> Self {
        Self {
            poll_script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn failing_fetch(message: &str) -> Self {
        Self {
            fetch_error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Relay for ScriptedRelay {
    async fn fetch_pkps(&self, _token: &IdentityToken) -> Result<Vec<PkpRecord>, RelayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.fetch_error {
            Some(message) => Err(RelayError::Request(message.clone())),
            None => Ok(self.pkps.clone()),
        }
    }

    async fn request_mint(&self, _token: &IdentityToken) -> Result<MintRequestId, RelayError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MintRequestId("r1".into()))
    }

    async fn poll_mint_status(&self, _request_id: &MintRequestId) -> Result<MintStatus, RelayError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MintStatus::Pending))
    }
}

// =============================================================================
// Local signing network
// =============================================================================

/// Signing network backed by one local key: what the threshold network does
/// across nodes, this does in-process, so recovery really exercises the
/// signature path.
struct LocalNetwork {
    signer: PrivateKeySigner,
    connected: AtomicBool,
    connect_calls: AtomicU32,
    announce_chain: String,
    seen_chain_id: Mutex<Option<u64>>,
    session_error: Option<String>,
    execute_error: Option<String>,
    flip_parity: bool,
}

impl LocalNetwork {
    fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            connected: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            announce_chain: "ethereum".to_string(),
            seen_chain_id: Mutex::new(None),
            session_error: None,
            execute_error: None,
            flip_parity: false,
        }
    }

    fn announcing_chain(mut self, chain: &str) -> Self {
        self.announce_chain = chain.to_string();
        self
    }

    fn start_connected(self) -> Self {
        self.connected.store(true, Ordering::SeqCst);
        self
    }

    fn failing_sessions(mut self, message: &str) -> Self {
        self.session_error = Some(message.to_string());
        self
    }

    fn failing_execution(mut self, message: &str) -> Self {
        self.execute_error = Some(message.to_string());
        self
    }

    fn flipping_parity(mut self) -> Self {
        self.flip_parity = true;
        self
    }

    fn seen_chain_id(&self) -> Option<u64> {
        *self.seen_chain_id.lock().unwrap()
    }

    /// PKP record whose address belongs to this network's signer.
    fn pkp(&self) -> PkpRecord {
        PkpRecord {
            token_id: "1".into(),
            eth_address: self.signer.address().to_string(),
            public_key: "pk-local".into(),
        }
    }
}

#[async_trait]
impl SigningNetwork for LocalNetwork {
    async fn connect(&self) -> Result<(), SessionError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn sign_session_key(&self, request: SessionKeyRequest) -> Result<AuthSig, SessionError> {
        *self.seen_chain_id.lock().unwrap() = Some(request.chain_id);
        Ok(AuthSig {
            sig: "0xsessionsig".into(),
            derived_via: "session-key-delegation".into(),
            signed_message: format!("delegate {} until {}", request.public_key, request.expiration),
            address: self.signer.address().to_string(),
        })
    }

    async fn create_delegated_session(
        &self,
        params: SessionParams<'_>,
        auth_needed: AuthNeededCallback<'_>,
    ) -> Result<SessionCredentials, SessionError> {
        if let Some(message) = &self.session_error {
            return Err(SessionError::Unreachable(message.clone()));
        }

        let auth_sig = auth_needed(AuthCallbackParams {
            chain: self.announce_chain.clone(),
            expiration: params.expiration.to_string(),
            resources: params.resources.to_vec(),
        })
        .await?;

        let mut signatures = BTreeMap::new();
        signatures.insert("node-1".to_string(), auth_sig);
        Ok(SessionCredentials {
            session_key: "0xsessionkey".into(),
            signatures,
            expiration: params.expiration.to_string(),
        })
    }

    async fn execute_signing_action(
        &self,
        action: SigningAction<'_>,
        _credentials: &SessionCredentials,
    ) -> Result<SignatureShare, SigningError> {
        if let Some(message) = &self.execute_error {
            return Err(SigningError::Execution(message.clone()));
        }

        let signature = self
            .signer
            .sign_hash_sync(&action.to_sign)
            .map_err(|e| SigningError::Execution(e.to_string()))?;

        let mut recid = u8::from(signature.v());
        if self.flip_parity {
            recid ^= 1;
        }
        Ok(SignatureShare {
            r: alloy::hex::encode(B256::from(signature.r())),
            s: alloy::hex::encode(B256::from(signature.s())),
            recid,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config() -> FlowConfig {
    FlowConfig {
        poll: PollPolicy {
            interval: Duration::ZERO,
            max_attempts: 5,
        },
        ..FlowConfig::default()
    }
}

fn callback_url(token: &str) -> Url {
    Url::parse(&format!(
        "http://localhost:3000/?provider=google&id_token={token}"
    ))
    .unwrap()
}

fn minted_record() -> PkpRecord {
    PkpRecord {
        token_id: "1".into(),
        eth_address: "0xA".into(),
        public_key: "pk1".into(),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn plain_visit_stays_on_sign_in() {
    let relay = ScriptedRelay::default();
    let network = LocalNetwork::new(PrivateKeySigner::random());
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    let current = Url::parse("http://localhost:3000/").unwrap();
    assert!(!flow.is_redirect_callback(&current));
    flow.handle_redirect(&current).await;

    assert_eq!(flow.view().kind(), ViewKind::SignIn);
    assert_eq!(flow.history(), &[ViewKind::SignIn]);
}

#[tokio::test]
async fn redirect_with_no_existing_pkps_lands_on_fetched() {
    let relay = ScriptedRelay::with_pkps(vec![]);
    let network = LocalNetwork::new(PrivateKeySigner::random());
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;

    assert_eq!(
        flow.history(),
        &[
            ViewKind::SignIn,
            ViewKind::HandlingRedirect,
            ViewKind::Fetching,
            ViewKind::Fetched,
        ]
    );
    // Empty is a valid terminal: the host offers the mint affordance.
    assert!(flow.pkps().is_empty());
    assert!(flow.context().has_token());
    assert_eq!(flow.relay().fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mint_polls_to_terminal_and_creates_a_session() {
    let relay = ScriptedRelay::with_poll_script(vec![
        MintStatus::Pending,
        MintStatus::Pending,
        MintStatus::Minted(minted_record()),
    ]);
    let network = LocalNetwork::new(PrivateKeySigner::random());
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.mint().await;

    assert_eq!(
        flow.history(),
        &[
            ViewKind::SignIn,
            ViewKind::HandlingRedirect,
            ViewKind::Fetching,
            ViewKind::Fetched,
            ViewKind::Minting,
            ViewKind::Minted,
            ViewKind::CreatingSession,
            ViewKind::SessionCreated,
        ]
    );
    // The grown list itself is kept, holding the new record.
    assert_eq!(flow.pkps(), &[minted_record()]);
    let session = flow.session().unwrap();
    assert_eq!(session.pkp, minted_record());
    assert!(!session.credentials.signatures.is_empty());
    // Two pending answers, then the terminal one.
    assert_eq!(flow.relay().poll_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn session_failure_is_dismissed_back_to_fetched() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).failing_sessions("network unreachable");
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;

    match flow.view() {
        View::Error(error) => {
            assert!(error.to_string().contains("network unreachable"));
        }
        other => panic!("expected error view, got {other:?}"),
    }

    // No credentials were stored, so recovery lands on Fetched.
    flow.dismiss_error();
    assert_eq!(flow.view().kind(), ViewKind::Fetched);
    assert!(flow.session().is_none());
    assert_eq!(flow.pkps(), &[pkp]);
}

#[tokio::test]
async fn signing_verifies_the_recovered_address() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer);
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    // Selection matches addresses case-insensitively.
    flow.select_pkp(&pkp.eth_address.to_lowercase()).await;
    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);

    flow.sign_message("hello").await;
    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);

    let signed = flow.signed_message().unwrap();
    assert_eq!(signed.message, "hello");
    assert!(signed.verified);
    assert!(signed.signature.starts_with("0x"));
    assert!(signed
        .recovered_address
        .eq_ignore_ascii_case(&pkp.eth_address));
    assert!(!flow.history().contains(&ViewKind::Error));
}

#[tokio::test]
async fn corrupted_signature_does_not_verify() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).flipping_parity();
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;
    flow.sign_message("hello").await;

    // Recovery still succeeds, but lands on a different address.
    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);
    let signed = flow.signed_message().unwrap();
    assert!(!signed.verified);
    assert!(!signed
        .recovered_address
        .eq_ignore_ascii_case(&pkp.eth_address));
}

#[tokio::test]
async fn signing_failure_is_dismissed_back_to_the_session() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).failing_execution("nodes offline");
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;
    flow.sign_message("hello").await;

    assert_eq!(flow.view().kind(), ViewKind::Error);
    assert!(flow.signed_message().is_none());

    // Credentials survived the failure, so recovery returns to the session.
    flow.dismiss_error();
    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);
    assert!(flow.session().is_some());
}

#[tokio::test]
async fn fetch_failure_keeps_the_token_for_recovery() {
    let relay = ScriptedRelay::failing_fetch("relay down");
    let network = LocalNetwork::new(PrivateKeySigner::random());
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;

    match flow.view() {
        View::Error(FlowError::Fetch(cause)) => {
            assert!(cause.to_string().contains("relay down"));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }

    flow.dismiss_error();
    assert_eq!(flow.view().kind(), ViewKind::Fetched);
    assert!(flow.context().has_token());
}

#[tokio::test]
async fn steps_out_of_order_never_touch_collaborators() {
    let relay = ScriptedRelay::default();
    let network = LocalNetwork::new(PrivateKeySigner::random());
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    // Mint without a token.
    flow.mint().await;
    assert_eq!(flow.view().kind(), ViewKind::Error);
    flow.dismiss_error();
    assert_eq!(flow.view().kind(), ViewKind::SignIn);

    // Sign without a session.
    flow.sign_message("hello").await;
    assert_eq!(flow.view().kind(), ViewKind::Error);
    flow.dismiss_error();

    // Select without any fetched key pairs.
    flow.select_pkp("0xA").await;
    match flow.view() {
        View::Error(FlowError::StepOutOfOrder { .. }) => {}
        other => panic!("expected step-out-of-order, got {other:?}"),
    }

    // Every guard fired before any collaborator was called.
    assert_eq!(flow.relay().mint_calls.load(Ordering::SeqCst), 0);
    assert_eq!(flow.relay().poll_calls.load(Ordering::SeqCst), 0);
    assert_eq!(flow.network().connect_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_chain_falls_back_to_the_default_chain_id() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).announcing_chain("unknown-chain");
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;

    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);
    // The session-key request went out on the default chain.
    assert_eq!(flow.network().seen_chain_id(), Some(1));
}

#[tokio::test]
async fn known_chain_resolves_to_its_chain_id() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).announcing_chain("avalanche");
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;

    assert_eq!(flow.network().seen_chain_id(), Some(43114));
}

#[tokio::test]
async fn an_existing_connection_is_reused() {
    let signer = PrivateKeySigner::random();
    let network = LocalNetwork::new(signer).start_connected();
    let pkp = network.pkp();
    let relay = ScriptedRelay::with_pkps(vec![pkp.clone()]);
    let mut flow = OnboardingFlow::new(test_config(), relay, network);

    flow.handle_redirect(&callback_url("abc")).await;
    flow.select_pkp(&pkp.eth_address).await;

    assert_eq!(flow.view().kind(), ViewKind::SessionCreated);
    assert_eq!(
        flow.network().connect_calls.load(Ordering::SeqCst),
        0
    );
}
