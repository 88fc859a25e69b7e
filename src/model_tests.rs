use super::*;

#[test]
fn thread_status_round_trips_through_str() {
    for status in [
        ThreadStatus::Active,
        ThreadStatus::Pending,
        ThreadStatus::Running,
        ThreadStatus::NeedsAttention,
        ThreadStatus::Done,
        ThreadStatus::NewMessage,
    ] {
        assert_eq!(ThreadStatus::parse(status.as_str()), Some(status));
    }
}

#[test]
fn permission_mode_default_is_accept_edits() {
    assert_eq!(PermissionMode::default(), PermissionMode::AcceptEdits);
}

#[test]
fn usage_add_is_cumulative() {
    let mut usage = Usage::default();
    usage.add(10, 20, 0.01);
    usage.add(5, 5, 0.02);
    assert_eq!(usage.input_tokens, 15);
    assert_eq!(usage.output_tokens, 25);
    assert!((usage.total_cost_usd - 0.03).abs() < 1e-9);
}

#[test]
fn usage_combine_sums_two_counters() {
    let a = Usage { input_tokens: 1, output_tokens: 2, total_cost_usd: 0.5 };
    let b = Usage { input_tokens: 3, output_tokens: 4, total_cost_usd: 0.25 };
    let c = a.combine(&b);
    assert_eq!(c.input_tokens, 4);
    assert_eq!(c.output_tokens, 6);
    assert!((c.total_cost_usd - 0.75).abs() < 1e-9);
}
