// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the crate. Configuration is loaded from the environment by the
//! host via [`crate::flow::FlowConfig::from_env`] and
//! [`crate::relay::RelayClient::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `REDIRECT_URI` | URI the identity provider redirects back to | `http://localhost:3000` |
//! | `LOGIN_BASE_URL` | Hosted sign-in page of the identity gateway | `https://login.antei.xyz/auth/google` |
//! | `RELAY_API_URL` | Base URL of the PKP relay service | `https://relay.antei.xyz` |
//! | `RELAY_API_KEY` | API key presented to the relay | Required for `RelayClient::from_env` |

use std::env;

/// Environment variable name for the sign-in redirect URI.
pub const REDIRECT_URI_ENV: &str = "REDIRECT_URI";

/// Environment variable name for the identity gateway's hosted login page.
pub const LOGIN_BASE_URL_ENV: &str = "LOGIN_BASE_URL";

/// Environment variable name for the relay service base URL.
pub const RELAY_API_URL_ENV: &str = "RELAY_API_URL";

/// Environment variable name for the relay API key.
pub const RELAY_API_KEY_ENV: &str = "RELAY_API_KEY";

/// Default redirect URI during local development.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000";

/// Default hosted login page.
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.antei.xyz/auth/google";

/// Default relay service base URL.
pub const DEFAULT_RELAY_API_URL: &str = "https://relay.antei.xyz";

/// Read an environment variable, falling back to a default when unset or empty.
pub(crate) fn env_or_default(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read a required environment variable, reporting its name when missing.
pub(crate) fn env_required(name: &str) -> Result<String, String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(name.to_string()),
    }
}
