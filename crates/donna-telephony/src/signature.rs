//! Twilio webhook signature validation.
//!
//! Twilio signs every webhook: HMAC-SHA1 over the full request URL with the
//! form parameters appended in sorted order, base64-encoded into the
//! `X-Twilio-Signature` header. Requests that fail validation are rejected
//! with 403 at the admission layer.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Result, TransportError};

type HmacSha1 = Hmac<Sha1>;

/// Validate `signature` (the raw header value) against the request.
///
/// `url` must be the externally visible URL Twilio called, including scheme
/// and query string. `params` are the POST form fields; pass an empty slice
/// for GET requests.
pub fn validate(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> Result<()> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = String::from(url);
    for (name, value) in sorted {
        data.push_str(name);
        data.push_str(value);
    }

    let expected = base64::engine::general_purpose::STANDARD
        .decode(signature.trim())
        .map_err(|_| TransportError::Signature("signature is not valid base64".into()))?;

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .map_err(|_| TransportError::Signature("invalid HMAC key length".into()))?;
    mac.update(data.as_bytes());

    mac.verify_slice(&expected)
        .map_err(|_| TransportError::Signature("signature mismatch".into()))
}

/// Compute the signature Twilio would send — test helper and doc anchor for
/// the exact signing scheme.
pub fn sign(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = String::from(url);
    for (name, value) in sorted {
        data.push_str(name);
        data.push_str(value);
    }

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).expect("hmac accepts any key");
    mac.update(data.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("CallSid".to_string(), "CA123".to_string()),
            ("AccountSid".to_string(), "AC456".to_string()),
            ("From".to_string(), "+15551234567".to_string()),
        ]
    }

    #[test]
    fn valid_signature_passes() {
        let url = "https://donna.example.com/twilio/voice";
        let sig = sign("token-secret", url, &params());
        assert!(validate("token-secret", url, &params(), &sig).is_ok());
    }

    #[test]
    fn tampered_params_fail() {
        let url = "https://donna.example.com/twilio/voice";
        let sig = sign("token-secret", url, &params());
        let mut tampered = params();
        tampered[0].1 = "CA999".to_string();
        assert!(validate("token-secret", url, &tampered, &sig).is_err());
    }

    #[test]
    fn wrong_token_fails() {
        let url = "https://donna.example.com/twilio/voice";
        let sig = sign("token-secret", url, &params());
        assert!(validate("other-token", url, &params(), &sig).is_err());
    }

    #[test]
    fn signature_is_order_insensitive_over_params() {
        let url = "https://donna.example.com/twilio/voice";
        let mut shuffled = params();
        shuffled.reverse();
        let sig = sign("token-secret", url, &params());
        assert!(validate("token-secret", url, &shuffled, &sig).is_ok());
    }

    #[test]
    fn garbage_signature_is_rejected_not_panicked() {
        let url = "https://donna.example.com/twilio/voice";
        assert!(validate("token-secret", url, &params(), "!!not-base64!!").is_err());
    }
}
