use super::*;

#[test]
fn register_cancels_prior_handle_for_same_thread() {
    let registry = TaskRegistry::new();
    let (first, _ticket1) = registry.register("t1");
    assert!(!first.is_cancelled());
    let (second, _ticket2) = registry.register("t1");
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
}

#[test]
fn deregister_with_stale_ticket_does_not_evict_current() {
    let registry = TaskRegistry::new();
    let (_first, ticket1) = registry.register("t1");
    let (_second, _ticket2) = registry.register("t1");
    registry.deregister("t1", ticket1);
    assert!(registry.is_registered("t1"));
}

#[test]
fn deregister_with_current_ticket_removes_entry() {
    let registry = TaskRegistry::new();
    let (_token, ticket) = registry.register("t1");
    registry.deregister("t1", ticket);
    assert!(!registry.is_registered("t1"));
}

#[test]
fn cancel_all_cancels_every_registered_token() {
    let registry = TaskRegistry::new();
    let (a, _) = registry.register("t1");
    let (b, _) = registry.register("t2");
    registry.cancel_all();
    assert!(a.is_cancelled());
    assert!(b.is_cancelled());
}
