// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::HeaderValue;

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in pairs {
        if let (Ok(name), Ok(value)) =
            (k.parse::<axum::http::HeaderName>(), HeaderValue::from_str(v))
        {
            map.insert(name, value);
        }
    }
    map
}

#[test]
fn bearer_token_accepted() {
    let h = headers(&[("authorization", "Bearer secret-key")]);
    assert!(validate_key(&h, "secret-key").is_ok());
}

#[test]
fn x_api_key_accepted() {
    let h = headers(&[("x-api-key", "secret-key")]);
    assert!(validate_key(&h, "secret-key").is_ok());
}

#[test]
fn wrong_or_missing_key_rejected() {
    assert!(validate_key(&headers(&[]), "secret-key").is_err());
    assert!(validate_key(&headers(&[("x-api-key", "nope")]), "secret-key").is_err());
    assert!(validate_key(&headers(&[("authorization", "Bearer nope")]), "secret-key").is_err());
    // Malformed scheme does not fall through to X-API-Key.
    assert!(validate_key(
        &headers(&[("authorization", "Basic abc"), ("x-api-key", "secret-key")]),
        "secret-key"
    )
    .is_err());
}

#[test]
fn comparison_is_length_guarded() {
    assert!(validate_key(&headers(&[("x-api-key", "secret-ke")]), "secret-key").is_err());
    assert!(validate_key(&headers(&[("x-api-key", "secret-keyy")]), "secret-key").is_err());
}
