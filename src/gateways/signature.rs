use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verify a `t=<unix seconds>,v1=<hex hmac-sha256>` header computed over
/// `"{t}.{body}"` with the gateway's webhook secret. The timestamp must fall
/// within `tolerance_secs` of `now`.
pub fn verify_timestamped_hmac(
    body: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut provided = None;
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            provided = Some(v);
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
    let provided = provided.ok_or(PaymentError::InvalidSignature)?;

    let webhook_time: i64 = timestamp.parse().map_err(|_| PaymentError::InvalidSignature)?;
    if (now.timestamp() - webhook_time).abs() > tolerance_secs {
        return Err(PaymentError::InvalidSignature);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    let provided_bytes = hex::decode(provided).map_err(|_| PaymentError::InvalidSignature)?;
    if constant_time_eq(&provided_bytes, &expected) {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

/// Hex HMAC-SHA256 over `"{ts}.{body}"`; the counterpart of
/// [`verify_timestamped_hmac`] for providers (and tests) producing the header.
pub fn timestamped_hmac_hex(body: &[u8], secret: &str, ts: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(ts.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Hash-style scheme used by providers that embed the signature in the
/// payload: hex(SHA-256(v1 ‖ v2 ‖ … ‖ secret)). The provided hash is compared
/// case-insensitively in constant time.
pub fn field_hash(values: &[&str], secret: &str) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        hasher.update(v.as_bytes());
    }
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_field_hash(values: &[&str], provided: &str, secret: &str) -> Result<(), PaymentError> {
    let expected = field_hash(values, secret);
    let provided = provided.to_ascii_lowercase();
    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_timestamped_hmac() {
        let now = Utc::now();
        let body = br#"{"event":"checkout.completed"}"#;
        let sig = timestamped_hmac_hex(body, "whsec_abc", now.timestamp());
        let header = format!("t={},v1={}", now.timestamp(), sig);
        assert!(verify_timestamped_hmac(body, &header, "whsec_abc", 300, now).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let now = Utc::now();
        let body = br#"{"event":"checkout.completed"}"#;
        let sig = timestamped_hmac_hex(body, "whsec_abc", now.timestamp());
        let header = format!("t={},v1={}", now.timestamp(), sig);
        let tampered = br#"{"event":"checkout.completed","amount":1}"#;
        assert!(verify_timestamped_hmac(tampered, &header, "whsec_abc", 300, now).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let now = Utc::now();
        let stale = now.timestamp() - 600;
        let body = b"{}";
        let sig = timestamped_hmac_hex(body, "whsec_abc", stale);
        let header = format!("t={},v1={}", stale, sig);
        assert!(verify_timestamped_hmac(body, &header, "whsec_abc", 300, now).is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        let now = Utc::now();
        assert!(verify_timestamped_hmac(b"{}", "v1=deadbeef", "s", 300, now).is_err());
        assert!(verify_timestamped_hmac(b"{}", "t=123", "s", 300, now).is_err());
        assert!(verify_timestamped_hmac(b"{}", "garbage", "s", 300, now).is_err());
    }

    #[test]
    fn field_hash_comparison_is_case_insensitive() {
        let values = ["PAY-ABC123", "SUCCESSFUL", "txn_9", "2000"];
        let hash = field_hash(&values, "secret");
        assert!(verify_field_hash(&values, &hash.to_uppercase(), "secret").is_ok());
        assert!(verify_field_hash(&values, &hash, "secret").is_ok());
    }

    #[test]
    fn field_hash_rejects_wrong_secret_or_values() {
        let values = ["PAY-ABC123", "SUCCESSFUL", "txn_9", "2000"];
        let hash = field_hash(&values, "secret");
        assert!(verify_field_hash(&values, &hash, "other").is_err());
        let reordered = ["SUCCESSFUL", "PAY-ABC123", "txn_9", "2000"];
        assert!(verify_field_hash(&reordered, &hash, "secret").is_err());
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
