use std::sync::Arc;

use clap::Parser;
use tempfile::tempdir;

use super::*;
use crate::driver::AgentDriver;
use crate::model::{NewThread, ThreadStatus};
use crate::test_support::HangingDriver;

fn test_config() -> Config {
    Config::parse_from(["threadhost"])
}

fn noop_driver() -> Arc<dyn AgentDriver> {
    Arc::new(HangingDriver)
}

#[tokio::test]
async fn new_wires_every_collaborator_and_notifications_target() {
    let store = Store::open_in_memory().unwrap();
    let app = App::new(test_config(), store, noop_driver());

    assert!(!app.notifications.has_pending("anything"));
    assert!(!app.rendezvous.has_pending("anything"));
    let thread = app.store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
    assert_eq!(thread.status, ThreadStatus::Active);
}

#[tokio::test]
async fn open_resets_pending_threads_left_by_a_crashed_process() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("threadhost.db");
    let mut cfg = test_config();
    cfg.database_path = Some(db_path.clone());

    {
        let store = Store::open(&db_path).unwrap();
        let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
        store.update_thread_status(&thread.id, ThreadStatus::Pending).unwrap();
    }

    let app = App::open(cfg, noop_driver()).unwrap();
    let threads = app.store.list_threads(false).unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].status, ThreadStatus::Active);
}

#[tokio::test]
async fn shutdown_stops_background_loops_and_cancels_tasks() {
    let store = Store::open_in_memory().unwrap();
    let app = App::new(test_config(), store, noop_driver());
    let thread = app.store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
    let (token, _ticket) = app.tasks.register(&thread.id);

    let handles = app.spawn_background_loops();
    app.shutdown(handles).await;

    assert!(token.is_cancelled());
}
