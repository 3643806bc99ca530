//! Request handlers

pub mod channels;
pub mod health;
pub mod wallets;

use axum::http::HeaderMap;

/// The replay-safety header, forwarded to the engine when present.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn idempotency_key_header_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        headers.insert("Idempotency-Key", HeaderValue::from_static("ik-1"));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("ik-1"));
    }
}
