//! Bearer token inspection.
//!
//! Tokens are `header.payload.signature`. Only the payload is read, and the
//! signature is never checked: the issuing API re-authorizes every privileged
//! request, so decoded claims are for display and expiry only.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde_json::{Map, Value};

/// Number of leading token characters kept when a token is logged.
const REDACT_VISIBLE_CHARS: usize = 8;

/// Claims decoded from a token's payload segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPayload {
    claims: Map<String, Value>,
}

impl TokenPayload {
    /// Expiry in seconds since the epoch, if present and numeric.
    pub fn exp(&self) -> Option<f64> {
        self.claims.get("exp").and_then(Value::as_f64)
    }

    /// Subject identifier. Numeric subjects are rendered as strings.
    pub fn sub(&self) -> Option<String> {
        match self.claims.get("sub")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.claims
            .get("email")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.claims.get(claim)
    }
}

/// Decode the payload segment of a token.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64-encoded JSON object in the middle.
pub fn decode_payload(token: &str) -> Option<TokenPayload> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = decode_segment(payload)?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(claims) => Some(TokenPayload { claims }),
        _ => None,
    }
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    if trimmed.is_empty() {
        return None;
    }
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

/// Whether the token should be treated as expired right now.
///
/// Fail-closed: undecodable tokens and tokens without a numeric `exp` are
/// expired.
pub fn is_expired(token: &str) -> bool {
    let now = Utc::now().timestamp_millis() as f64 / 1000.0;
    is_expired_at(token, now)
}

/// Same as [`is_expired`] against an explicit clock (seconds since epoch).
pub fn is_expired_at(token: &str, now_secs: f64) -> bool {
    match decode_payload(token).and_then(|p| p.exp()) {
        Some(exp) => exp < now_secs,
        None => true,
    }
}

/// Shorten a token for log output.
pub fn redact(token: &str) -> String {
    let visible: String = token.chars().take(REDACT_VISIBLE_CHARS).collect();
    format!("{}...", visible)
}

#[cfg(test)]
pub(crate) fn encode_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    #[test]
    fn test_decode_valid_payload() {
        let token = encode_token(&json!({"exp": 1_900_000_000, "sub": "u42", "email": "a@b.com"}));
        let payload = decode_payload(&token).expect("token should decode");
        assert_eq!(payload.exp(), Some(1_900_000_000.0));
        assert_eq!(payload.sub().as_deref(), Some("u42"));
        assert_eq!(payload.email(), Some("a@b.com"));
    }

    #[test]
    fn test_numeric_subject() {
        let token = encode_token(&json!({"exp": 1, "sub": 17}));
        let payload = decode_payload(&token).unwrap();
        assert_eq!(payload.sub().as_deref(), Some("17"));
    }

    #[test]
    fn test_padded_and_standard_alphabet_accepted() {
        let claims = br#"{"exp":9999999999,"n":"~~~>"}"#;
        let standard = base64::engine::general_purpose::STANDARD.encode(claims);
        let token = format!("h.{}.s", standard);
        assert!(decode_payload(&token).is_some());
        assert!(!is_expired(&token));
    }

    #[test]
    fn test_malformed_tokens_are_expired() {
        let cases = [
            "",
            "abc",
            "a.b",
            "a.b.c.d",
            "header..sig",
            "header.!!!notbase64!!!.sig",
            // Valid base64 but not JSON
            "header.bm90IGpzb24.sig",
            // Valid JSON but not an object
            "header.WzEsMiwzXQ.sig",
            // Truncated payload segment
            "header.eyJleHAiOjE2MDAwMDAwMDAsInN1YiI6InU0Mij19.sig",
        ];
        for token in cases {
            assert!(decode_payload(token).is_none(), "decoded {:?}", token);
            assert!(is_expired(token), "accepted {:?}", token);
        }
    }

    #[test]
    fn test_missing_or_non_numeric_exp_is_expired() {
        assert!(is_expired(&encode_token(&json!({"sub": "u1"}))));
        assert!(is_expired(&encode_token(&json!({"exp": "tomorrow"}))));
        assert!(is_expired(&encode_token(&json!({"exp": null}))));
    }

    #[test]
    fn test_expiry_against_clock() {
        let past = encode_token(&json!({"exp": 1_600_000_000}));
        assert!(is_expired(&past));

        let future = encode_token(&json!({"exp": now() + 3600}));
        assert!(!is_expired(&future));

        let token = encode_token(&json!({"exp": 1000}));
        assert!(!is_expired_at(&token, 999.5));
        assert!(!is_expired_at(&token, 1000.0));
        assert!(is_expired_at(&token, 1000.5));
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("eyJhbGciOiJIUzI1NiJ9.x.y"), "eyJhbGci...");
        assert_eq!(redact("abc"), "abc...");
    }
}
