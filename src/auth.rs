// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sign-In Redirect Handling
//!
//! URL-level half of the federated sign-in flow: compose the hosted login
//! URL, recognize the provider's redirect back to the app, and extract the
//! bearer token it carries. Everything here is pure over the given URLs; the
//! browser-side redirect mechanics belong to the identity gateway.
//!
//! ## Callback shape
//!
//! The gateway redirects to the configured `redirect_uri` with query
//! parameters `provider=<name>&id_token=<token>`, or `error=<message>` when
//! sign-in failed upstream.

use url::Url;

use crate::models::IdentityToken;

/// Query parameter naming the provider on a sign-in callback.
const PROVIDER_PARAM: &str = "provider";

/// Query parameter carrying the identity token on a sign-in callback.
const ID_TOKEN_PARAM: &str = "id_token";

/// Query parameter carrying an upstream sign-in failure.
const ERROR_PARAM: &str = "error";

/// Query parameter telling the gateway where to send the user back to.
const APP_REDIRECT_PARAM: &str = "app_redirect";

/// Errors raised while handling the sign-in redirect.
#[derive(Debug, thiserror::Error)]
pub enum RedirectError {
    /// A URL could not be parsed or composed.
    #[error("redirect URI is invalid: {0}")]
    InvalidUri(String),

    /// The identity provider reported a sign-in failure.
    #[error("identity provider returned an error: {0}")]
    Provider(String),

    /// The callback carried no identity token.
    #[error("redirect callback is missing an identity token")]
    MissingToken,
}

/// Compose the hosted login URL the host should navigate to.
///
/// The gateway is told where to redirect back to via the `app_redirect`
/// query parameter.
pub fn build_login_url(login_base_url: &str, redirect_uri: &str) -> Result<Url, RedirectError> {
    let mut url = Url::parse(login_base_url).map_err(|e| RedirectError::InvalidUri(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair(APP_REDIRECT_PARAM, redirect_uri);
    Ok(url)
}

/// Pure predicate: is `current` the gateway's redirect back to `redirect_uri`?
///
/// True only when the location sits under the configured redirect URI and
/// names a provider. A plain visit to the app (no `provider` parameter) is
/// not a callback.
pub fn is_redirect_callback(current: &Url, redirect_uri: &str) -> bool {
    current.as_str().starts_with(redirect_uri)
        && current.query_pairs().any(|(key, _)| key == PROVIDER_PARAM)
}

/// Extract the identity token from a sign-in callback URL.
///
/// An upstream `error` parameter takes precedence over a missing token so
/// the provider's own message is what reaches the user.
pub fn extract_token(current: &Url) -> Result<IdentityToken, RedirectError> {
    if let Some((_, message)) = current.query_pairs().find(|(key, _)| key == ERROR_PARAM) {
        return Err(RedirectError::Provider(message.into_owned()));
    }

    match current.query_pairs().find(|(key, _)| key == ID_TOKEN_PARAM) {
        Some((_, token)) if !token.is_empty() => Ok(IdentityToken::from(token.into_owned())),
        _ => Err(RedirectError::MissingToken),
    }
}
