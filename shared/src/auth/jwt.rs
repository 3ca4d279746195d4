//! Compact HS256 tokens issued after a successful Cognito sign-in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bughunt_atoms::users::Role;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    Algorithm,
    #[error("bad token signature")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    Key,
    #[error("cannot encode claims")]
    Encode,
}

fn mac(secret: &[u8]) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret).map_err(|_| TokenError::Key)
}

pub fn issue(secret: &[u8], username: &str, role: Role, now: i64, ttl_secs: i64) -> Result<String, TokenError> {
    let claims = Claims {
        sub: username.to_string(),
        role,
        iat: now,
        exp: now + ttl_secs,
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).map_err(|_| TokenError::Encode)?)
    );
    let mut mac = mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", signing_input, signature))
}

pub fn verify(secret: &[u8], token: &str, now: i64) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(TokenError::Malformed),
    };

    let header_json: serde_json::Value = URL_SAFE_NO_PAD
        .decode(header)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(TokenError::Malformed)?;
    if header_json.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
        return Err(TokenError::Algorithm);
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;
    let mut mac = mac(secret)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).map_err(|_| TokenError::Signature)?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(TokenError::Malformed)?;
    if claims.exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_token_verifies() {
        let token = issue(SECRET, "hank", Role::Hunter, 1_000, 60).unwrap();
        let claims = verify(SECRET, &token, 1_030).unwrap();
        assert_eq!(claims.sub, "hank");
        assert_eq!(claims.role, Role::Hunter);
        assert_eq!(claims.exp, 1_060);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue(SECRET, "hank", Role::Hunter, 1_000, 60).unwrap();
        assert_eq!(verify(SECRET, &token, 1_060), Err(TokenError::Expired));
    }

    #[test]
    fn other_secret_fails_signature() {
        let token = issue(SECRET, "hank", Role::Hunter, 1_000, 60).unwrap();
        assert_eq!(
            verify(b"another-secret-another-secret-xx", &token, 1_001),
            Err(TokenError::Signature)
        );
    }

    #[test]
    fn tampered_role_fails_signature() {
        let token = issue(SECRET, "hank", Role::Hunter, 1_000, 60).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"hank","role":"admin","iat":1000,"exp":1060}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert_eq!(verify(SECRET, &forged, 1_001), Err(TokenError::Signature));
    }

    #[test]
    fn none_algorithm_is_refused() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"x","role":"admin","iat":0,"exp":9999999999}"#);
        let token = format!("{}.{}.", header, claims);
        assert_eq!(verify(SECRET, &token, 1), Err(TokenError::Algorithm));
        assert_eq!(verify(SECRET, "a.b", 1), Err(TokenError::Malformed));
    }
}
