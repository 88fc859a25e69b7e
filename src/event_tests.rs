use super::*;

#[test]
fn type_tag_matches_wire_name() {
    assert_eq!(ThreadEvent::TextDelta { content: "hi".into() }.type_tag(), "text_delta");
    assert_eq!(ThreadEvent::Stopped {}.type_tag(), "stopped");
    assert_eq!(
        ThreadEvent::StatusChange { status: ThreadStatus::Running }.type_tag(),
        "status_change"
    );
}

#[test]
fn tool_result_serializes_with_tagged_type() {
    let event = ThreadEvent::ToolResult {
        tool_use_id: "abc".into(),
        is_error: false,
        content: Some("ok".into()),
        thread_id: None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "tool_result");
    assert_eq!(json["tool_use_id"], "abc");
    assert!(json.get("thread_id").is_none());
}
