use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Semaphore;

use super::*;
use crate::model::NewThread;
use crate::task_registry::TaskRegistry;
use crate::test_support::{status_event, text_event, FakeDriver, HangingDriver};

fn test_config() -> Arc<Config> {
    let mut cfg = Config::parse_from(["threadhost"]);
    cfg.agent_timeout_secs = 1;
    cfg.max_retries = 1;
    Arc::new(cfg)
}

fn make_engine(driver: Arc<dyn AgentDriver>, config: Arc<Config>) -> (Arc<Store>, ExecutionEngine) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bus = Arc::new(EventBus::new(Arc::clone(&store)));
    let rendezvous = Arc::new(Rendezvous::new());
    let tasks = Arc::new(TaskRegistry::new());
    let semaphore = Arc::new(Semaphore::new(2));
    let engine = ExecutionEngine::new(Arc::clone(&store), bus, rendezvous, tasks, semaphore, driver, config);
    (store, engine)
}

#[tokio::test]
async fn completed_turn_persists_text_and_marks_done_on_signal() {
    let driver = Arc::new(FakeDriver::single_turn(vec![
        text_event("hello there"),
        Ok(AgentEvent::ToolUse {
            id: "t1".into(),
            name: "SignalStatus".into(),
            input: Some(serde_json::json!({"status": "done", "reason": "finished"})),
        }),
        Ok(AgentEvent::ToolResult { tool_use_id: Some("t1".into()), is_error: false, content: Some("ok".into()) }),
        status_event("done"),
    ]));
    let (store, engine) = make_engine(driver, test_config());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let outcome = engine.run_turn(RunTurnRequest::new(thread.id.clone(), "hi"), &NoParentLink).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));

    let reloaded = store.get_thread(&thread.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::Done);
}

#[tokio::test]
async fn sub_thread_with_no_signal_is_treated_as_done() {
    let driver = Arc::new(FakeDriver::single_turn(vec![text_event("all set"), status_event("ok")]));
    let (store, engine) = make_engine(driver, test_config());
    let parent = store.create_thread(NewThread { title: "parent".into(), ..Default::default() }).unwrap();
    let child = store
        .create_thread(NewThread { title: "child".into(), parent_id: Some(parent.id.clone()), ..Default::default() })
        .unwrap();

    let outcome = engine.run_turn(RunTurnRequest::new(child.id.clone(), "go"), &NoParentLink).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));
}

#[tokio::test]
async fn timeout_marks_thread_needs_attention_and_errors() {
    let driver = Arc::new(HangingDriver);
    let (store, engine) = make_engine(driver, test_config());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let result = engine.run_turn(RunTurnRequest::new(thread.id.clone(), "hi"), &NoParentLink).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::Timeout);

    let reloaded = store.get_thread(&thread.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::NeedsAttention);
}

#[tokio::test]
async fn crash_retries_with_resumption_then_succeeds() {
    let driver = Arc::new(FakeDriver::new(vec![
        vec![Err(crate::driver::DriverCrash { message: "boom".into() })],
        vec![text_event("recovered"), status_event("done")],
    ]));
    let (store, engine) = make_engine(Arc::clone(&driver) as Arc<dyn AgentDriver>, test_config());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let outcome = engine.run_turn(RunTurnRequest::new(thread.id.clone(), "hi"), &NoParentLink).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));
    assert_eq!(driver.call_count(), 2);
}

#[tokio::test]
async fn crash_exhausts_retries_and_reports_driver_crash() {
    let driver = Arc::new(FakeDriver::new(vec![
        vec![Err(crate::driver::DriverCrash { message: "boom 1".into() })],
        vec![Err(crate::driver::DriverCrash { message: "boom 2".into() })],
    ]));
    let mut cfg = Config::parse_from(["threadhost"]);
    cfg.agent_timeout_secs = 5;
    cfg.max_retries = 1;
    let (store, engine) = make_engine(Arc::clone(&driver) as Arc<dyn AgentDriver>, Arc::new(cfg));
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let result = engine.run_turn(RunTurnRequest::new(thread.id.clone(), "hi"), &NoParentLink).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::DriverCrash);
    assert_eq!(driver.call_count(), 2);

    let reloaded = store.get_thread(&thread.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::NeedsAttention);
}

#[tokio::test]
async fn cancelling_before_admission_leaves_thread_active_and_stops() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bus = Arc::new(EventBus::new(Arc::clone(&store)));
    let rendezvous = Arc::new(Rendezvous::new());
    let tasks = Arc::new(TaskRegistry::new());
    // Exhaust the only permit so admission blocks, then cancel via a second registration.
    let semaphore = Arc::new(Semaphore::new(1));
    let _held = Arc::clone(&semaphore).acquire_owned().await.unwrap();
    let driver: Arc<dyn AgentDriver> = Arc::new(HangingDriver);
    let engine = ExecutionEngine::new(Arc::clone(&store), bus, rendezvous, Arc::clone(&tasks), semaphore, driver, test_config());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let thread_id = thread.id.clone();
    let run = tokio::spawn(async move {
        let engine = engine;
        engine.run_turn(RunTurnRequest::new(thread_id, "hi"), &NoParentLink).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    tasks.cancel(&thread.id);

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, TurnOutcome::Stopped);
    let reloaded = store.get_thread(&thread.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::Active);
}

#[tokio::test]
async fn task_tool_use_materialises_ephemeral_thread_and_closes_with_subagent_stop() {
    let driver = Arc::new(FakeDriver::single_turn(vec![
        Ok(AgentEvent::ToolUse { id: "sub-1".into(), name: "Task".into(), input: Some(serde_json::json!({"description": "investigate the bug"})) }),
        Ok(AgentEvent::ToolResult { tool_use_id: Some("sub-1".into()), is_error: false, content: Some("investigation complete".into()) }),
        status_event("done"),
    ]));
    let (store, engine) = make_engine(driver, test_config());
    let thread = store.create_thread(NewThread { title: "t".into(), allow_nested_subthreads: Some(true), max_thread_depth: Some(2), ..Default::default() }).unwrap();

    let outcome = engine.run_turn(RunTurnRequest::new(thread.id.clone(), "hi"), &NoParentLink).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));

    let child = store.get_thread("sub-1").unwrap().expect("ephemeral sub-agent thread created");
    assert_eq!(child.status, ThreadStatus::Done);
    assert_eq!(child.parent_id.as_deref(), Some(thread.id.as_str()));
    assert!(child.title.starts_with("investigate the bug"));
}

/// Records every [`ParentLink`] callback it receives, for asserting on
/// exactly-once delivery.
#[derive(Default)]
struct RecordingParentLink {
    signals: std::sync::Mutex<Vec<(ThreadStatus, String)>>,
    terminals: std::sync::Mutex<Vec<(ThreadStatus, Option<String>, bool)>>,
}

impl ParentLink for RecordingParentLink {
    fn on_signal_status<'a>(&'a self, _child: &'a Thread, status: ThreadStatus, reason: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.signals.lock().unwrap().push((status, reason));
            Ok(())
        })
    }

    fn on_terminal<'a>(&'a self, _child: &'a Thread, status: ThreadStatus, reason: Option<String>, already_signaled: bool) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.terminals.lock().unwrap().push((status, reason, already_signaled));
        })
    }
}

#[tokio::test]
async fn signal_status_broadcasts_live_and_terminal_notification_is_deduped() {
    let driver = Arc::new(FakeDriver::single_turn(vec![
        text_event("on it"),
        Ok(AgentEvent::ToolUse {
            id: "sig-1".into(),
            name: "SignalStatus".into(),
            input: Some(serde_json::json!({"status": "done", "reason": "finished the task"})),
        }),
        Ok(AgentEvent::ToolResult { tool_use_id: Some("sig-1".into()), is_error: false, content: Some("ok".into()) }),
        status_event("done"),
    ]));
    let (store, engine) = make_engine(driver, test_config());
    let parent = store.create_thread(NewThread { title: "parent".into(), ..Default::default() }).unwrap();
    let child = store
        .create_thread(NewThread { title: "child".into(), parent_id: Some(parent.id.clone()), ..Default::default() })
        .unwrap();

    let parent_link = RecordingParentLink::default();
    let outcome = engine.run_turn(RunTurnRequest::new(child.id.clone(), "go"), &parent_link).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));

    let signals = parent_link.signals.lock().unwrap();
    assert_eq!(signals.len(), 1, "signal_status must broadcast to the parent exactly once");
    assert_eq!(signals[0], (ThreadStatus::Done, "finished the task".to_string()));
    drop(signals);

    let terminals = parent_link.terminals.lock().unwrap();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].0, ThreadStatus::Done);
    assert!(terminals[0].2, "on_terminal must know the live signal already published subthread_status");
}
