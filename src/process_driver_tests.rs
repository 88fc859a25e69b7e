use std::sync::Arc;

use super::*;
use crate::model::PermissionMode;

fn sample_ctx() -> TurnContext {
    TurnContext {
        thread_id: "t1".into(),
        prompt: "hello".into(),
        images: vec![],
        session_id: Some("sess-abc".into()),
        model: "claude-opus-4-5".into(),
        permission_mode: PermissionMode::Plan,
        extended_thinking: true,
        can_spawn: true,
        is_subthread: false,
        continuation: false,
        env: HashMap::new(),
        bus: Arc::new(crate::event_bus::EventBus::new(Arc::new(crate::store::Store::open_in_memory().unwrap()))),
        rendezvous: Arc::new(crate::rendezvous::Rendezvous::new()),
    }
}

#[test]
fn turn_request_carries_session_and_permission_mode() {
    let ctx = sample_ctx();
    let request = TurnRequest::from(&ctx);
    assert_eq!(request.session_id.as_deref(), Some("sess-abc"));
    assert_eq!(request.permission_mode, "plan");
    assert!(request.extended_thinking);
    assert!(request.can_spawn);
}

#[test]
fn turn_request_serializes_without_session_id_when_absent() {
    let mut ctx = sample_ctx();
    ctx.session_id = None;
    let request = TurnRequest::from(&ctx);
    let json = serde_json::to_value(&request).unwrap();
    assert!(json.get("session_id").is_none());
}
