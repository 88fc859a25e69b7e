use super::*;

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn new_thread(title: &str) -> NewThread {
    NewThread { title: title.to_string(), ..Default::default() }
}

#[test]
fn create_and_get_thread_round_trips() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    assert_eq!(t.title, "T1");
    assert_eq!(t.status, ThreadStatus::Active);
    let fetched = s.get_thread(&t.id).unwrap().unwrap();
    assert_eq!(fetched.id, t.id);
}

#[test]
fn create_thread_rejects_bad_title_length() {
    let s = store();
    assert!(s.create_thread(new_thread("")).is_err());
    let long = "x".repeat(256);
    assert!(s.create_thread(new_thread(&long)).is_err());
}

#[test]
fn append_event_assigns_dense_monotonic_seq() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    let seq1 = s.append_event(&t.id, "text_delta", "{}").unwrap();
    let seq2 = s.append_event(&t.id, "text_delta", "{}").unwrap();
    assert_eq!(seq1 + 1, seq2);
}

#[test]
fn events_since_returns_ordered_suffix() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    for i in 0..5 {
        s.append_event(&t.id, "text_delta", &format!("{{\"n\":{i}}}")).unwrap();
    }
    let since = s.events_since(&t.id, 2).unwrap();
    assert_eq!(since.len(), 3);
    assert!(since.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn trim_never_renumbers() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    let _first = s.append_event(&t.id, "text_delta", "{}").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = s.append_event(&t.id, "text_delta", "{}").unwrap();
    s.trim_events_older_than(0).unwrap();
    let remaining = s.events_since(&t.id, 0).unwrap();
    assert!(remaining.iter().all(|(seq, ..)| *seq <= second));
}

#[test]
fn clear_thread_messages_resets_session() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    s.update_thread_session(&t.id, Some("sess-1")).unwrap();
    s.add_message(&t.id, MessageRole::User, "hi", None).unwrap();
    s.clear_thread_messages(&t.id).unwrap();
    let fetched = s.get_thread(&t.id).unwrap().unwrap();
    assert!(fetched.session_id.is_none());
    let page = s.get_messages_paginated(&t.id, 100, 0).unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn pagination_counts_offset_from_the_end() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    for i in 0..5 {
        s.add_message(&t.id, MessageRole::User, &format!("msg{i}"), None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    let page = s.get_messages_paginated(&t.id, 2, 1).unwrap();
    assert_eq!(page.total, 5);
    let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["msg2", "msg3"]);
}

#[test]
fn archive_then_unarchive_preserves_other_state() {
    let s = store();
    let t = s.create_thread(new_thread("T1")).unwrap();
    s.archive_thread(&t.id).unwrap();
    assert!(s.get_thread(&t.id).unwrap().unwrap().archived_at.is_some());
    assert!(s.archive_thread(&t.id).is_err());
    s.unarchive_thread(&t.id).unwrap();
    let fetched = s.get_thread(&t.id).unwrap().unwrap();
    assert!(fetched.archived_at.is_none());
    assert_eq!(fetched.title, "T1");
}

#[test]
fn thread_depth_walks_parent_chain() {
    let s = store();
    let root = s.create_thread(new_thread("root")).unwrap();
    let mut parent_id = root.id.clone();
    for _ in 0..3 {
        let child = s.create_thread(NewThread { title: "child".into(), parent_id: Some(parent_id.clone()), ..Default::default() }).unwrap();
        parent_id = child.id;
    }
    assert_eq!(s.thread_depth(&root.id).unwrap(), 0);
    assert_eq!(s.thread_depth(&parent_id).unwrap(), 3);
}

#[test]
fn usage_with_children_sums_descendants() {
    let s = store();
    let root = s.create_thread(new_thread("root")).unwrap();
    let child = s.create_thread(NewThread { title: "child".into(), parent_id: Some(root.id.clone()), ..Default::default() }).unwrap();
    s.update_thread_usage(&root.id, 10, 20, 1.0).unwrap();
    s.update_thread_usage(&child.id, 5, 5, 0.5).unwrap();
    let total = s.thread_usage_with_children(&root.id).unwrap();
    assert_eq!(total.input_tokens, 15);
    assert_eq!(total.output_tokens, 25);
    assert!((total.total_cost_usd - 1.5).abs() < 1e-9);
}

#[test]
fn estimate_tokens_is_chars_over_four() {
    assert_eq!(estimate_tokens("abcdefgh"), 2);
}
