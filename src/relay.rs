// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # PKP Relay Client
//!
//! The relay brokers key-pair fetching and minting on behalf of a
//! federated-identity-authenticated user. Minting is asynchronous on the
//! relay side: a mint request returns a request id, and the caller polls the
//! request's status until it reaches a terminal state.
//!
//! [`Relay`] is the trait the onboarding flow drives; [`RelayClient`] is the
//! HTTP implementation. Poll pacing and the attempt budget live in
//! [`PollPolicy`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config;
use crate::models::{IdentityToken, PkpRecord};

/// Path for fetching the key pairs owned by an authenticated user.
const FETCH_PKPS_PATH: &str = "/auth/fetch-pkps";

/// Path for requesting a new key-pair mint.
const MINT_PKP_PATH: &str = "/auth/mint-pkp";

/// Path prefix for polling a mint request's status.
const STATUS_PATH: &str = "/auth/status";

/// Default pause between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of status polls before giving up.
const DEFAULT_POLL_ATTEMPTS: u32 = 20;

/// Errors raised by the relay collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Required configuration was absent.
    #[error("relay configuration missing: {0}")]
    MissingConfig(String),

    /// The relay could not be reached.
    #[error("relay request failed: {0}")]
    Request(String),

    /// The relay answered with something the client cannot use.
    #[error("relay response was invalid: {0}")]
    InvalidResponse(String),

    /// The relay refused the request.
    #[error("relay rejected the request: {0}")]
    Rejected(String),

    /// Polling ran out of attempts before the mint reached a terminal state.
    #[error("mint did not reach a terminal state after {attempts} polls")]
    MintTimedOut { attempts: u32 },
}

/// Identifier of an in-flight mint request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequestId(pub String);

impl std::fmt::Display for MintRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a mint request as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintStatus {
    /// The relay is still working on the request.
    Pending,
    /// The mint completed; the new key pair is attached.
    Minted(PkpRecord),
    /// The relay gave up on the request.
    Failed(String),
}

/// The relay service, as seen by the onboarding flow.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Fetch the key pairs associated with the token's account, oldest first.
    ///
    /// An empty list is a valid answer, not an error.
    async fn fetch_pkps(&self, token: &IdentityToken) -> Result<Vec<PkpRecord>, RelayError>;

    /// Ask the relay to mint a new key pair for the token's account.
    async fn request_mint(&self, token: &IdentityToken) -> Result<MintRequestId, RelayError>;

    /// Probe the status of a mint request once.
    async fn poll_mint_status(&self, request_id: &MintRequestId) -> Result<MintStatus, RelayError>;
}

/// Pacing and attempt budget for the mint poll cycle.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Pause between polls.
    pub interval: Duration,
    /// Number of polls before the cycle gives up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Poll a mint request until it reaches a terminal state.
///
/// Returns the minted record, maps a relay-reported failure to
/// [`RelayError::Rejected`], and gives up with [`RelayError::MintTimedOut`]
/// once the policy's attempt budget is spent.
pub async fn poll_until_terminal<R: Relay + ?Sized>(
    relay: &R,
    request_id: &MintRequestId,
    policy: &PollPolicy,
) -> Result<PkpRecord, RelayError> {
    for attempt in 1..=policy.max_attempts {
        match relay.poll_mint_status(request_id).await? {
            MintStatus::Minted(pkp) => {
                info!(request_id = %request_id, attempt, "mint reached terminal state");
                return Ok(pkp);
            }
            MintStatus::Failed(reason) => return Err(RelayError::Rejected(reason)),
            MintStatus::Pending => {
                debug!(request_id = %request_id, attempt, "mint still pending");
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
    Err(RelayError::MintTimedOut {
        attempts: policy.max_attempts,
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FetchPkpsResponse {
    pkps: Option<Vec<PkpRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintResponse {
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintStatusResponse {
    status: String,
    pkp_token_id: Option<String>,
    pkp_eth_address: Option<String>,
    pkp_public_key: Option<String>,
    error: Option<String>,
}

impl MintStatusResponse {
    fn into_status(self) -> Result<MintStatus, RelayError> {
        match self.status.as_str() {
            "InProgress" => Ok(MintStatus::Pending),
            "Succeeded" => {
                match (self.pkp_token_id, self.pkp_eth_address, self.pkp_public_key) {
                    (Some(token_id), Some(eth_address), Some(public_key)) => {
                        Ok(MintStatus::Minted(PkpRecord {
                            token_id,
                            eth_address,
                            public_key,
                        }))
                    }
                    _ => Err(RelayError::InvalidResponse(
                        "mint succeeded but response is missing the new key pair".to_string(),
                    )),
                }
            }
            "Failed" => Ok(MintStatus::Failed(
                self.error
                    .unwrap_or_else(|| "relay reported failure without detail".to_string()),
            )),
            other => Err(RelayError::InvalidResponse(format!(
                "unknown mint status `{other}`"
            ))),
        }
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// HTTP client for the PKP relay service.
#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl RelayClient {
    /// Create a client for the given relay.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RelayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RelayError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    /// Create a client from the environment.
    ///
    /// Reads `RELAY_API_URL` (with default) and the required `RELAY_API_KEY`.
    pub fn from_env() -> Result<Self, RelayError> {
        let base_url = config::env_or_default(config::RELAY_API_URL_ENV, config::DEFAULT_RELAY_API_URL);
        let api_key = config::env_required(config::RELAY_API_KEY_ENV)
            .map_err(RelayError::MissingConfig)?;
        Self::new(base_url, api_key)
    }

    /// The relay base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, RelayError> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, path, "relay request");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("api-key", &self.api_key)
            .header("x-request-id", request_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| RelayError::Request(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, RelayError> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, path, "relay request");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .header("api-key", &self.api_key)
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|e| RelayError::Request(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| String::new());
        Err(RelayError::Rejected(format!("HTTP {status}: {body}")))
    }
}

#[async_trait]
impl Relay for RelayClient {
    async fn fetch_pkps(&self, token: &IdentityToken) -> Result<Vec<PkpRecord>, RelayError> {
        let response = self
            .post_json(FETCH_PKPS_PATH, &json!({ "idToken": token.as_str() }))
            .await?;
        let body: FetchPkpsResponse = response
            .json()
            .await
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        body.pkps.ok_or_else(|| {
            RelayError::InvalidResponse("relay response is missing pkps".to_string())
        })
    }

    async fn request_mint(&self, token: &IdentityToken) -> Result<MintRequestId, RelayError> {
        let response = self
            .post_json(MINT_PKP_PATH, &json!({ "idToken": token.as_str() }))
            .await?;
        let body: MintResponse = response
            .json()
            .await
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        body.request_id.map(MintRequestId).ok_or_else(|| {
            RelayError::InvalidResponse("relay response is missing requestId".to_string())
        })
    }

    async fn poll_mint_status(&self, request_id: &MintRequestId) -> Result<MintStatus, RelayError> {
        let response = self.get(&format!("{STATUS_PATH}/{request_id}")).await?;
        let body: MintStatusResponse = response
            .json()
            .await
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))?;
        body.into_status()
    }
}
