use super::*;
use crate::test_support::FakeDriver;
use tokio_stream::StreamExt;

#[test]
fn agent_event_tool_result_serializes_with_kind_tag() {
    let event = AgentEvent::ToolResult { tool_use_id: Some("a".into()), is_error: false, content: Some("ok".into()) };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "tool_result");
    assert_eq!(json["tool_use_id"], "a");
}

#[tokio::test]
async fn fake_driver_replays_its_script_in_order() {
    let driver = FakeDriver::single_turn(vec![
        Ok(AgentEvent::Text { content: "hello".into() }),
        Ok(AgentEvent::Status { status: "done".into(), session_id: Some("s1".into()) }),
    ]);
    let ctx = TurnContext {
        thread_id: "t1".into(),
        prompt: "hi".into(),
        images: vec![],
        session_id: None,
        model: "claude-opus-4-5".into(),
        permission_mode: PermissionMode::AcceptEdits,
        extended_thinking: false,
        can_spawn: false,
        is_subthread: false,
        continuation: false,
        env: HashMap::new(),
        bus: std::sync::Arc::new(crate::event_bus::EventBus::new(std::sync::Arc::new(crate::store::Store::open_in_memory().unwrap()))),
        rendezvous: std::sync::Arc::new(crate::rendezvous::Rendezvous::new()),
    };
    let mut stream = driver.invoke(ctx);
    let first = stream.next().await.unwrap().unwrap();
    assert!(matches!(first, AgentEvent::Text { .. }));
    let second = stream.next().await.unwrap().unwrap();
    assert!(matches!(second, AgentEvent::Status { .. }));
    assert!(stream.next().await.is_none());
    assert_eq!(driver.call_count(), 1);
}
