// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Signature Assembly & Local Verification
//!
//! The network returns signature-share material; this module turns it into a
//! canonical 65-byte ECDSA signature, recovers the signing address locally
//! from `(message, signature)`, and compares it against the PKP's known
//! address. The comparison is a local trust check: it does not echo anything
//! the network said, it re-derives the signer from the signature itself.

use alloy::primitives::{eip191_hash_message, Signature, B256};

use crate::models::SignedMessage;
use crate::network::{SignatureShare, SigningError};

/// Source of the delegated signing action executed on the network.
///
/// The action requests an ECDSA share over `toSign` for `publicKey`; the
/// nodes' shares are combined into the response returned under `sigName`.
pub const SIGN_ACTION_CODE: &str = r#"
(async () => {
  await Actions.signEcdsa({ toSign, publicKey, sigName });
})();
"#;

/// Signature name the flow requests results under.
pub const DEFAULT_SIG_NAME: &str = "sig1";

/// EIP-191 digest of a plaintext message.
///
/// This is the 32-byte value handed to the network as `toSign`; the same
/// prefixing is applied by recovery, so a round trip lands on the original
/// signer.
pub fn message_digest(message: &str) -> B256 {
    eip191_hash_message(message.as_bytes())
}

/// Assemble share material into a canonical signature.
///
/// Accepts `r`/`s` hex scalars with or without a `0x` prefix and a recovery
/// id in either 0/1 or legacy 27/28 form.
pub fn assemble_signature(share: &SignatureShare) -> Result<Signature, SigningError> {
    let r = parse_scalar("r", &share.r)?;
    let s = parse_scalar("s", &share.s)?;
    let parity = match share.recid {
        0 | 27 => false,
        1 | 28 => true,
        other => {
            return Err(SigningError::MalformedShare(format!(
                "recovery id {other} out of range"
            )))
        }
    };
    Ok(Signature::from_scalars_and_parity(r, s, parity))
}

/// Parse one 32-byte hex scalar from a share.
fn parse_scalar(field: &str, value: &str) -> Result<B256, SigningError> {
    let bytes = alloy::hex::decode(value)
        .map_err(|e| SigningError::MalformedShare(format!("scalar {field} is not hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(SigningError::MalformedShare(format!(
            "scalar {field} is {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Recover the signer from `(message, signature)` and compare it against the
/// expected address, case-insensitively.
///
/// The result records the recovered address either way; `verified` is true
/// iff it matches `expected_address`.
pub fn verify_message(
    message: &str,
    signature: &Signature,
    expected_address: &str,
) -> Result<SignedMessage, SigningError> {
    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| SigningError::Recovery(e.to_string()))?;

    let recovered_address = recovered.to_string();
    let verified = recovered_address.eq_ignore_ascii_case(expected_address);

    Ok(SignedMessage {
        message: message.to_string(),
        signature: format!("0x{}", alloy::hex::encode(signature.as_bytes())),
        recovered_address,
        verified,
    })
}
