// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Onboarding State Machine
//!
//! Sequences the asynchronous, fallible onboarding steps and exposes exactly
//! one [`View`] to the host at any time:
//!
//! ```text
//! SignIn -> HandlingRedirect -> Fetching -> Fetched
//!            Fetched -(mint)-> Minting -> Minted -> CreatingSession
//!            Fetched -(select)-> CreatingSession
//!            CreatingSession -> SessionCreated -(sign)-> SessionCreated
//! ```
//!
//! Any step failure lands in [`View::Error`] carrying the cause; a single
//! acknowledge action ([`OnboardingFlow::dismiss_error`]) returns to the last
//! stable state computed by [`recovery_view`]. Accumulated context (token,
//! key-pair list, current session) survives failed steps so dismissal never
//! restarts the whole flow.
//!
//! ## Sequencing
//!
//! Every step takes `&mut self`, so the exclusive borrow is what guarantees
//! that no two state-mutating steps run concurrently. There is no
//! cancellation: dropping the flow abandons in-flight work.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{self, RedirectError};
use crate::chains;
use crate::config;
use crate::models::{IdentityToken, PkpRecord, PkpSession, SignedMessage};
use crate::network::{
    AuthCallbackParams, AuthNeededCallback, SessionError, SessionKeyRequest, SessionParams,
    SigningAction, SigningError, SigningNetwork,
};
use crate::relay::{poll_until_terminal, PollPolicy, Relay, RelayError};
use crate::signing;

/// Resource scope requested for delegated sessions.
pub const DEFAULT_SESSION_RESOURCE: &str = "signing-action://*";

/// How long a requested session should stay valid.
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Step-boundary error taxonomy.
///
/// One variant per failure class; each wraps the collaborator error that
/// caused it, and `Display` surfaces that cause verbatim for the host to
/// show.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Sign-in redirect handling failed.
    #[error("sign-in failed: {0}")]
    Redirect(#[from] RedirectError),

    /// Fetching the key-pair list failed.
    #[error("fetching key pairs failed: {0}")]
    Fetch(#[source] RelayError),

    /// Minting a key pair failed or never reached a terminal state.
    #[error("minting a key pair failed: {0}")]
    Mint(#[source] RelayError),

    /// Creating the delegated session failed.
    #[error("creating a session failed: {0}")]
    Session(#[from] SessionError),

    /// Executing or verifying the signing action failed.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    /// A step was invoked before its prerequisite existed.
    ///
    /// Raised locally, before any collaborator is touched.
    #[error("cannot {step} without {missing}")]
    StepOutOfOrder {
        step: &'static str,
        missing: &'static str,
    },
}

/// The single active view the host renders.
///
/// A closed sum type: exactly one variant is active at a time, and `Error`
/// cannot exist without its cause attached.
#[derive(Debug)]
pub enum View {
    /// Not signed in; the host shows the sign-in affordance.
    SignIn,
    /// A provider redirect was detected and is being processed.
    HandlingRedirect,
    /// Fetching the account's key pairs.
    Fetching,
    /// Key pairs fetched (possibly none); the host offers select-or-mint.
    Fetched,
    /// A mint request is in flight.
    Minting,
    /// The mint reached a terminal record.
    Minted,
    /// Delegated session credentials are being requested.
    CreatingSession,
    /// A session is active; signing is available and results appear here.
    SessionCreated,
    /// A step failed; dismissing returns to the last stable state.
    Error(FlowError),
}

impl View {
    /// The payload-free tag of this view.
    pub fn kind(&self) -> ViewKind {
        match self {
            View::SignIn => ViewKind::SignIn,
            View::HandlingRedirect => ViewKind::HandlingRedirect,
            View::Fetching => ViewKind::Fetching,
            View::Fetched => ViewKind::Fetched,
            View::Minting => ViewKind::Minting,
            View::Minted => ViewKind::Minted,
            View::CreatingSession => ViewKind::CreatingSession,
            View::SessionCreated => ViewKind::SessionCreated,
            View::Error(_) => ViewKind::Error,
        }
    }
}

/// Payload-free view tag, for comparisons and host-side rendering keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    SignIn,
    HandlingRedirect,
    Fetching,
    Fetched,
    Minting,
    Minted,
    CreatingSession,
    SessionCreated,
    Error,
}

/// Accumulated onboarding context.
///
/// Held separately from [`View`] because it must survive failed steps:
/// dismiss-recovery depends on the token, key-pair list, and session still
/// being there after an error. Everything is memory-only.
#[derive(Debug, Default)]
pub struct FlowContext {
    token: Option<IdentityToken>,
    pkps: Vec<PkpRecord>,
    session: Option<PkpSession>,
    signed: Option<SignedMessage>,
}

impl FlowContext {
    /// Whether an identity token has been extracted.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Key pairs owned by the signed-in account, oldest first.
    pub fn pkps(&self) -> &[PkpRecord] {
        &self.pkps
    }

    /// The active session, if one was created.
    pub fn session(&self) -> Option<&PkpSession> {
        self.session.as_ref()
    }

    /// Result of the most recent signing attempt.
    pub fn signed(&self) -> Option<&SignedMessage> {
        self.signed.as_ref()
    }
}

/// The last stable view to return to when an error is dismissed.
///
/// Pure over the accumulated context: a session outranks a token, a token
/// outranks nothing.
pub fn recovery_view(ctx: &FlowContext) -> View {
    if ctx.session.is_some() {
        View::SessionCreated
    } else if ctx.token.is_some() {
        View::Fetched
    } else {
        View::SignIn
    }
}

/// Flow configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// URI the identity provider redirects back to.
    pub redirect_uri: String,
    /// Hosted login page of the identity gateway.
    pub login_base_url: String,
    /// Chain the host wants sessions authorized for.
    pub chain: String,
    /// Resources requested for delegated sessions.
    pub session_resources: Vec<String>,
    /// Requested session lifetime.
    pub session_ttl: chrono::Duration,
    /// Pacing for the mint poll cycle.
    pub poll: PollPolicy,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            redirect_uri: config::DEFAULT_REDIRECT_URI.to_string(),
            login_base_url: config::DEFAULT_LOGIN_BASE_URL.to_string(),
            chain: chains::ETHEREUM.name.to_string(),
            session_resources: vec![DEFAULT_SESSION_RESOURCE.to_string()],
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            poll: PollPolicy::default(),
        }
    }
}

impl FlowConfig {
    /// Build a configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            redirect_uri: config::env_or_default(
                config::REDIRECT_URI_ENV,
                config::DEFAULT_REDIRECT_URI,
            ),
            login_base_url: config::env_or_default(
                config::LOGIN_BASE_URL_ENV,
                config::DEFAULT_LOGIN_BASE_URL,
            ),
            ..Self::default()
        }
    }
}

/// Drives the onboarding sequence against a relay and a signing network.
pub struct OnboardingFlow<R, N> {
    config: FlowConfig,
    relay: R,
    network: N,
    ctx: FlowContext,
    view: View,
    history: Vec<ViewKind>,
}

impl<R: Relay, N: SigningNetwork> OnboardingFlow<R, N> {
    /// Create a flow at the sign-in view.
    pub fn new(config: FlowConfig, relay: R, network: N) -> Self {
        Self {
            config,
            relay,
            network,
            ctx: FlowContext::default(),
            view: View::SignIn,
            history: vec![ViewKind::SignIn],
        }
    }

    /// The currently active view.
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Every view entered so far, in order.
    pub fn history(&self) -> &[ViewKind] {
        &self.history
    }

    /// The accumulated context.
    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    /// Key pairs owned by the signed-in account.
    pub fn pkps(&self) -> &[PkpRecord] {
        self.ctx.pkps()
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&PkpSession> {
        self.ctx.session()
    }

    /// Result of the most recent signing attempt.
    pub fn signed_message(&self) -> Option<&SignedMessage> {
        self.ctx.signed()
    }

    /// The relay collaborator.
    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// The signing-network collaborator.
    pub fn network(&self) -> &N {
        &self.network
    }

    /// The login URL the host should navigate to for sign-in.
    pub fn login_url(&self) -> Result<Url, FlowError> {
        Ok(auth::build_login_url(
            &self.config.login_base_url,
            &self.config.redirect_uri,
        )?)
    }

    /// Whether `current` is the identity gateway's redirect back to us.
    pub fn is_redirect_callback(&self, current: &Url) -> bool {
        auth::is_redirect_callback(current, &self.config.redirect_uri)
    }

    /// Handle the provider's redirect: extract the token and fetch the
    /// account's key pairs.
    ///
    /// A location that is not a callback leaves the view untouched. An empty
    /// key-pair list is still `Fetched`; the host offers the mint affordance.
    pub async fn handle_redirect(&mut self, current: &Url) -> &View {
        if !self.is_redirect_callback(current) {
            debug!("location is not a sign-in callback");
            return &self.view;
        }
        self.set_view(View::HandlingRedirect);
        if let Err(error) = self.try_handle_redirect(current).await {
            warn!(%error, "redirect handling failed");
            self.set_view(View::Error(error));
        }
        &self.view
    }

    async fn try_handle_redirect(&mut self, current: &Url) -> Result<(), FlowError> {
        let token = auth::extract_token(current)?;
        self.ctx.token = Some(token.clone());

        self.set_view(View::Fetching);
        let pkps = self
            .relay
            .fetch_pkps(&token)
            .await
            .map_err(FlowError::Fetch)?;
        info!(count = pkps.len(), "fetched key pairs");
        self.ctx.pkps = pkps;
        self.set_view(View::Fetched);
        Ok(())
    }

    /// Mint a new key pair, then create a session for it.
    pub async fn mint(&mut self) -> &View {
        if let Err(error) = self.try_mint().await {
            warn!(%error, "mint failed");
            self.set_view(View::Error(error));
        }
        &self.view
    }

    async fn try_mint(&mut self) -> Result<(), FlowError> {
        let token = self.require_token("mint a key pair")?;

        self.set_view(View::Minting);
        let request_id = self
            .relay
            .request_mint(&token)
            .await
            .map_err(FlowError::Mint)?;
        info!(%request_id, "mint requested");

        let minted = poll_until_terminal(&self.relay, &request_id, &self.config.poll)
            .await
            .map_err(FlowError::Mint)?;

        self.ctx.pkps.push(minted.clone());
        self.set_view(View::Minted);

        self.create_session(minted).await
    }

    /// Create a session for an already-owned key pair, selected by address.
    pub async fn select_pkp(&mut self, eth_address: &str) -> &View {
        let selected = self
            .ctx
            .pkps
            .iter()
            .find(|pkp| pkp.address_matches(eth_address))
            .cloned();
        let result = match selected {
            Some(pkp) => self.create_session(pkp).await,
            None => Err(FlowError::StepOutOfOrder {
                step: "create a session",
                missing: "a matching key pair",
            }),
        };
        if let Err(error) = result {
            warn!(%error, "session creation failed");
            self.set_view(View::Error(error));
        }
        &self.view
    }

    /// Request delegated credentials scoped to `pkp` and store them together
    /// with the key pair as one unit.
    async fn create_session(&mut self, pkp: PkpRecord) -> Result<(), FlowError> {
        let token = self.require_token("create a session")?;
        self.set_view(View::CreatingSession);

        let expiration = (Utc::now() + self.config.session_ttl).to_rfc3339();
        let network = &self.network;
        if !network.ready() {
            network.connect().await?;
        }

        let callback_key = pkp.public_key.clone();
        let callback_token = token.clone();
        let auth_needed: AuthNeededCallback<'_> = Box::new(move |params: AuthCallbackParams| {
            let public_key = callback_key.clone();
            let token = callback_token.clone();
            Box::pin(async move {
                // Unknown chains authorize on the default chain, they do not fail.
                let chain_id = chains::resolve_chain_id(&params.chain);
                network
                    .sign_session_key(SessionKeyRequest {
                        public_key,
                        token,
                        chain_id,
                        expiration: params.expiration,
                        resources: params.resources,
                    })
                    .await
            })
        });

        let credentials = network
            .create_delegated_session(
                SessionParams {
                    pkp: &pkp,
                    token: &token,
                    chain: &self.config.chain,
                    resources: &self.config.session_resources,
                    expiration: &expiration,
                },
                auth_needed,
            )
            .await?;

        info!(pkp = %pkp.eth_address, "session created");
        self.ctx.session = Some(PkpSession { pkp, credentials });
        self.set_view(View::SessionCreated);
        Ok(())
    }

    /// Sign a plaintext message with the active session and verify the
    /// result locally.
    ///
    /// On success the view stays `SessionCreated` with the result populated.
    pub async fn sign_message(&mut self, message: &str) -> &View {
        if let Err(error) = self.try_sign(message).await {
            warn!(%error, "signing failed");
            self.set_view(View::Error(error));
        }
        &self.view
    }

    async fn try_sign(&mut self, message: &str) -> Result<(), FlowError> {
        let session = self.ctx.session.as_ref().ok_or(FlowError::StepOutOfOrder {
            step: "sign a message",
            missing: "session credentials",
        })?;

        let share = self
            .network
            .execute_signing_action(
                SigningAction {
                    code: signing::SIGN_ACTION_CODE,
                    to_sign: signing::message_digest(message),
                    public_key: &session.pkp.public_key,
                    sig_name: signing::DEFAULT_SIG_NAME,
                },
                &session.credentials,
            )
            .await?;

        let signature = signing::assemble_signature(&share)?;
        let result = signing::verify_message(message, &signature, &session.pkp.eth_address)?;
        info!(
            verified = result.verified,
            recovered = %result.recovered_address,
            "message signed"
        );
        self.ctx.signed = Some(result);
        Ok(())
    }

    /// Acknowledge an error and return to the last stable view.
    ///
    /// A no-op outside the error view.
    pub fn dismiss_error(&mut self) -> &View {
        if matches!(self.view, View::Error(_)) {
            let next = recovery_view(&self.ctx);
            self.set_view(next);
        }
        &self.view
    }

    fn require_token(&self, step: &'static str) -> Result<IdentityToken, FlowError> {
        self.ctx.token.clone().ok_or(FlowError::StepOutOfOrder {
            step,
            missing: "an identity token",
        })
    }

    fn set_view(&mut self, view: View) {
        debug!(from = ?self.view.kind(), to = ?view.kind(), "view transition");
        self.history.push(view.kind());
        self.view = view;
    }
}
