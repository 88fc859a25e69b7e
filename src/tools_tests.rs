use super::*;

#[test]
fn rate_limiter_allows_up_to_five_then_rejects() {
    let limiter = SendRateLimiter::new();
    for _ in 0..5 {
        limiter.check_and_record("t1").expect("within limit");
    }
    let err = limiter.check_and_record("t1").unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::RateLimited);
}

#[test]
fn rate_limiter_tracks_sources_independently() {
    let limiter = SendRateLimiter::new();
    for _ in 0..5 {
        limiter.check_and_record("a").unwrap();
    }
    limiter.check_and_record("b").expect("independent bucket");
}
