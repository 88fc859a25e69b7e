use axum::http::HeaderMap;

use super::*;

#[test]
fn disabled_auth_accepts_anything() {
    let headers = HeaderMap::new();
    assert!(validate_bearer(&headers, None).is_ok());
}

#[test]
fn rejects_missing_header_when_token_configured() {
    let headers = HeaderMap::new();
    assert!(validate_bearer(&headers, Some("secret")).is_err());
}

#[test]
fn rejects_wrong_token() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer wrong".parse().unwrap());
    assert!(validate_bearer(&headers, Some("secret")).is_err());
}

#[test]
fn accepts_matching_token() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    assert!(validate_bearer(&headers, Some("secret")).is_ok());
}

#[test]
fn rejects_non_bearer_scheme() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Basic secret".parse().unwrap());
    assert!(validate_bearer(&headers, Some("secret")).is_err());
}
