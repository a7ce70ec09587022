//! Constant-time HMAC webhook signature verification, decode(header))`).

use beacon_models::service::{SignatureAlgorithm, SignatureFormat};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// `true` iff `header_value` is a valid signature of `body` under `secret`
/// per `algorithm`/`format`. Never short-circuits on length so timing does
/// not leak how much of the signature was correct.
pub fn verify(algorithm: SignatureAlgorithm, format: SignatureFormat, secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(provided) = decode(format, header_value) else { return false };
    let expected = match algorithm {
        SignatureAlgorithm::Sha256 => compute_sha256(secret, body),
        SignatureAlgorithm::Sha1 => compute_sha1(secret, body),
    };
    constant_time_eq(&expected, &provided)
}

fn compute_sha256(secret: &str, body: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn compute_sha1(secret: &str, body: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn decode(format: SignatureFormat, header_value: &str) -> Option<Vec<u8>> {
    // A digest header may be prefixed (`sha256=...`); strip up to the last `=` sign marker.
    let raw = header_value.rsplit_once('=').map(|(_, tail)| tail).unwrap_or(header_value);
    match format {
        SignatureFormat::Hex => hex::decode(raw).ok().or_else(|| hex::decode(header_value).ok()),
        SignatureFormat::Base64 => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(raw)
                .ok()
                .or_else(|| base64::engine::general_purpose::STANDARD.decode(header_value).ok())
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_hex_sha256_signature() {
        let secret = "shh";
        let body = b"{\"alert_id\":1}";
        let expected = compute_sha256(secret, body);
        let header = hex::encode(expected);
        assert!(verify(SignatureAlgorithm::Sha256, SignatureFormat::Hex, secret, body, &header));
    }

    #[test]
    fn rejects_tampered_body() {
        let secret = "shh";
        let body = b"{\"alert_id\":1}";
        let expected = compute_sha256(secret, body);
        let header = hex::encode(expected);
        assert!(!verify(SignatureAlgorithm::Sha256, SignatureFormat::Hex, secret, b"{\"alert_id\":2}", &header));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!verify(SignatureAlgorithm::Sha256, SignatureFormat::Hex, "shh", b"body", "not-hex!!"));
    }

    #[test]
    fn accepts_prefixed_sha256_equals_header() {
        let secret = "shh";
        let body = b"payload";
        let expected = compute_sha256(secret, body);
        let header = format!("sha256={}", hex::encode(expected));
        assert!(verify(SignatureAlgorithm::Sha256, SignatureFormat::Hex, secret, body, &header));
    }
}
