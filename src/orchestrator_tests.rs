use std::sync::Arc;

use clap::Parser;
use tokio::sync::Semaphore;

use super::*;
use crate::driver::AgentDriver;
use crate::model::NewThread;
use crate::test_support::{status_event, text_event, FakeDriver};
use crate::tools::{AgentToolRegistry, SpawnThreadArgs};

fn test_config() -> Arc<Config> {
    let mut cfg = Config::parse_from(["threadhost"]);
    cfg.agent_timeout_secs = 5;
    Arc::new(cfg)
}

fn make_orchestrator(driver: Arc<dyn AgentDriver>) -> (Arc<Store>, Arc<Orchestrator>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bus = Arc::new(EventBus::new(Arc::clone(&store)));
    let rendezvous = Arc::new(Rendezvous::new());
    let tasks = Arc::new(TaskRegistry::new());
    let semaphore = Arc::new(Semaphore::new(4));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&rendezvous),
        Arc::clone(&tasks),
        semaphore,
        driver,
        test_config(),
    ));
    let notifications = Arc::new(NotificationScheduler::new());
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), bus, rendezvous, tasks, engine, Arc::clone(&notifications)));
    notifications.wire_target(orchestrator.clone() as Arc<dyn crate::notification_scheduler::NotificationTarget>);
    (store, orchestrator)
}

#[tokio::test]
async fn send_message_persists_user_message_and_runs_a_turn() {
    let driver = Arc::new(FakeDriver::single_turn(vec![text_event("hi there"), status_event("done")]));
    let (store, orchestrator) = make_orchestrator(driver);
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    let outcome = orchestrator.send_message(&thread.id, "hello", vec![], &[]).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed(ThreadStatus::Done));

    let page = store.get_messages_paginated(&thread.id, 10, 0).unwrap();
    assert!(page.messages.iter().any(|m| m.content == "hello"));
}

#[tokio::test]
async fn send_message_rejects_unknown_thread() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (_, orchestrator) = make_orchestrator(driver);
    let result = orchestrator.send_message("missing", "hello", vec![], &[]).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::NotFound);
}

#[tokio::test]
async fn spawn_child_is_rejected_past_the_nesting_depth() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (store, orchestrator) = make_orchestrator(driver);
    // Default nesting policy forbids any nested sub-threads (max_thread_depth = 1).
    let root = store.create_thread(NewThread { title: "root".into(), ..Default::default() }).unwrap();

    let request = SpawnChildRequest { title: "child".into(), ..Default::default() };
    let first = orchestrator.spawn_child(&root.id, request.clone()).await.unwrap();
    assert_eq!(first.parent_id.as_deref(), Some(root.id.as_str()));

    let grandchild_request = SpawnChildRequest { title: "grandchild".into(), ..Default::default() };
    let result = orchestrator.spawn_child(&first.id, grandchild_request).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::DepthExceeded);
}

#[tokio::test]
async fn spawn_child_with_initial_message_runs_its_first_turn_in_background() {
    let driver = Arc::new(FakeDriver::single_turn(vec![text_event("on it"), status_event("done")]));
    let (store, orchestrator) = make_orchestrator(driver);
    let root = store.create_thread(NewThread { title: "root".into(), ..Default::default() }).unwrap();

    let request = SpawnChildRequest { title: "child".into(), initial_message: Some("go".into()), ..Default::default() };
    let child = orchestrator.spawn_child(&root.id, request).await.unwrap();

    // Give the backgrounded turn a moment to run to completion.
    for _ in 0..50 {
        if store.get_thread(&child.id).unwrap().unwrap().status == ThreadStatus::Done {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let reloaded = store.get_thread(&child.id).unwrap().unwrap();
    assert_eq!(reloaded.status, ThreadStatus::Done);
}

#[tokio::test]
async fn archive_clears_events_and_publishes_thread_archived() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (store, orchestrator) = make_orchestrator(driver);
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
    store.append_event(&thread.id, "message", "{}").unwrap();

    orchestrator.archive(&thread.id).await.unwrap();

    let reloaded = store.get_thread(&thread.id).unwrap().unwrap();
    assert!(reloaded.archived_at.is_some());
    assert_eq!(store.latest_seq(&thread.id).unwrap(), 0);
}

#[tokio::test]
async fn archive_twice_is_rejected() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (store, orchestrator) = make_orchestrator(driver);
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();

    orchestrator.archive(&thread.id).await.unwrap();
    let result = orchestrator.archive(&thread.id).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn send_to_thread_rejects_a_target_that_is_not_a_child_of_the_source() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (store, orchestrator) = make_orchestrator(driver);
    let a = store.create_thread(NewThread { title: "a".into(), ..Default::default() }).unwrap();
    let b = store.create_thread(NewThread { title: "b".into(), ..Default::default() }).unwrap();

    let result = orchestrator.send_to_thread(&a.id, &b.id, "hi".into()).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::Validation);
}

#[tokio::test]
async fn spawn_thread_tool_creates_a_child_under_the_caller() {
    let driver = Arc::new(FakeDriver::new(vec![]));
    let (store, orchestrator) = make_orchestrator(driver);
    let parent = store.create_thread(NewThread { title: "parent".into(), ..Default::default() }).unwrap();

    let args = SpawnThreadArgs { title: "child".into(), ..Default::default() };
    let child = orchestrator.spawn_thread(&parent.id, args).await.unwrap();
    assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
}
