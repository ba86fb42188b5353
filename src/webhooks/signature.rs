use crate::errors::ServiceError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Plain header pair accepted alongside the combined gateway header
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";
/// Combined header in the gateway's own format: `t=<unix>,v1=<hex>`
pub const GATEWAY_SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies HMAC-SHA256 webhook signatures against the raw request body.
///
/// The signed string is `"{timestamp}.{raw body}"`, so verification must see
/// the exact bytes the gateway sent. The timestamp is covered by the MAC;
/// a bounded tolerance window keeps captured events from being replayed later.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Computes the hex signature for a timestamp and raw payload.
    ///
    /// The same computation the gateway performs; test harnesses use it to
    /// produce valid deliveries.
    pub fn sign(&self, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies the request headers against the raw payload bytes.
    ///
    /// Fails closed: any missing, stale, or mismatched signature is an
    /// `InvalidSignature` error and the payload must not be parsed.
    pub fn verify(&self, headers: &HeaderMap, payload: &[u8]) -> Result<(), ServiceError> {
        let (timestamp, signature) = extract_signature(headers).ok_or_else(|| {
            ServiceError::InvalidSignature("missing webhook signature headers".to_string())
        })?;

        if self.tolerance_secs > 0 {
            if let Ok(ts) = timestamp.parse::<i64>() {
                let now = chrono::Utc::now().timestamp();
                if (now - ts).unsigned_abs() > self.tolerance_secs {
                    return Err(ServiceError::InvalidSignature(
                        "webhook timestamp outside tolerance".to_string(),
                    ));
                }
            }
        }

        let expected = self.sign(&timestamp, payload);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(ServiceError::InvalidSignature(
                "webhook signature mismatch".to_string(),
            ));
        }

        Ok(())
    }
}

/// Pulls (timestamp, signature) out of either accepted header shape
fn extract_signature(headers: &HeaderMap) -> Option<(String, String)> {
    if let (Some(ts), Some(sig)) = (headers.get(TIMESTAMP_HEADER), headers.get(SIGNATURE_HEADER)) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return Some((ts.to_string(), sig.to_string()));
        }
    }

    // Combined form: t=<unix>,v1=<hex>
    if let Some(raw) = headers
        .get(GATEWAY_SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in raw.split(',') {
            let mut it = part.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return Some((ts.to_string(), v1.to_string()));
        }
    }

    None
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.iter().zip(b) {
        res |= x ^ y;
    }
    res == 0
}
