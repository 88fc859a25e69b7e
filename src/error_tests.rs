use super::*;

#[test]
fn http_status_mapping_matches_spec() {
    assert_eq!(ErrorKind::NotFound.http_status(), 404);
    assert_eq!(ErrorKind::Validation.http_status(), 400);
    assert_eq!(ErrorKind::RateLimited.http_status(), 429);
    assert_eq!(ErrorKind::AlreadyPending.http_status(), 409);
    assert_eq!(ErrorKind::DepthExceeded.http_status(), 400);
    assert_eq!(ErrorKind::Cancelled.http_status(), 499);
    assert_eq!(ErrorKind::Timeout.http_status(), 504);
    assert_eq!(ErrorKind::DriverCrash.http_status(), 500);
    assert_eq!(ErrorKind::Infrastructure.http_status(), 500);
}

#[test]
fn display_uses_kind_and_message() {
    let err = ThreadHostError::not_found("thread t1");
    assert_eq!(err.to_string(), "NOT_FOUND: thread t1");
}

#[test]
fn rusqlite_error_maps_to_infrastructure() {
    let sqlite_err = rusqlite::Error::InvalidQuery;
    let err: ThreadHostError = sqlite_err.into();
    assert_eq!(err.kind, ErrorKind::Infrastructure);
}
