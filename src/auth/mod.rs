//! Bearer token verification for the gateway's connection handshake.
//!
//! Tokens are verified locally (no round trip to an auth service): a token
//! is `<base64url(userId)>.<base64url(hmac-sha256(secret, userId))>`, issued
//! by the surrounding auth system out of scope here. Verification is pure
//! CPU work and never suspends, matching §5's "Token verification is
//! CPU-only and non-suspending".

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Verify `token` against `secret`, returning the embedded `userId`.
///
/// Comparison of the computed and supplied signatures is constant-time to
/// avoid leaking signature bytes through timing.
pub fn verify_token(secret: &str, token: &str) -> Result<String, AuthError> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    let (user_id_part, sig_part) = token.split_once('.').ok_or(AuthError::InvalidSignature)?;

    let user_id = String::from_utf8(
        URL_SAFE_NO_PAD
            .decode(user_id_part)
            .map_err(|_| AuthError::InvalidSignature)?,
    )
    .map_err(|_| AuthError::InvalidSignature)?;

    let supplied_sig = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| AuthError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(user_id.as_bytes());
    let expected_sig = mac.finalize().into_bytes();

    if expected_sig.as_slice().ct_eq(&supplied_sig).into() {
        Ok(user_id)
    } else {
        Err(AuthError::InvalidSignature)
    }
}

/// Issue a token for `user_id`. Used by tests and by whatever external
/// system mints session tokens for this service to verify.
pub fn issue_token(secret: &str, user_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(user_id.as_bytes());
    let sig = mac.finalize().into_bytes();

    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(user_id.as_bytes()),
        URL_SAFE_NO_PAD.encode(sig)
    )
}

/// Extract a bearer token from the first inbound frame's raw text, or from
/// a `Authorization: Bearer <token>` header if the transport already parsed
/// one. The gateway tries the header first and falls back to the first
/// frame, so thin clients that can't set headers on a WebSocket upgrade
/// still have a path in.
pub fn extract_from_first_frame(raw: &str) -> Option<&str> {
    #[derive(serde::Deserialize)]
    struct AuthFrame<'a> {
        token: &'a str,
    }

    serde_json::from_str::<AuthFrame>(raw).ok().map(|f| f.token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_token_verifies_back_to_the_same_user() {
        let token = issue_token(SECRET, "u1");
        assert_eq!(verify_token(SECRET, &token).unwrap(), "u1");
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        let token = issue_token(SECRET, "u1");
        let with_prefix = format!("Bearer {token}");
        assert_eq!(verify_token(SECRET, &with_prefix).unwrap(), "u1");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let token = issue_token(SECRET, "u1");
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_token(SECRET, &tampered).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, "u1");
        assert!(verify_token("a-totally-different-secret-value", &token).is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(verify_token(SECRET, "not-a-valid-token").is_err());
    }
}
