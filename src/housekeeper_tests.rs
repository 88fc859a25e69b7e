use std::sync::Arc;

use clap::Parser;

use super::*;
use crate::model::NewThread;

fn test_config() -> Arc<Config> {
    Arc::new(Config::parse_from(["threadhost"]))
}

#[tokio::test]
async fn trims_events_older_than_retention_window() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
    store.append_event(&thread.id, "message", "{}").unwrap();

    let mut cfg = Config::parse_from(["threadhost"]);
    cfg.event_retention_hours = 0;
    let config = Arc::new(cfg);

    let housekeeper = Housekeeper::new(Arc::clone(&store), config);
    housekeeper.trim_once();

    assert_eq!(store.latest_seq(&thread.id).unwrap(), 0);
}

#[tokio::test]
async fn leaves_recent_events_within_retention_window() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let thread = store.create_thread(NewThread { title: "t".into(), ..Default::default() }).unwrap();
    store.append_event(&thread.id, "message", "{}").unwrap();

    let housekeeper = Housekeeper::new(Arc::clone(&store), test_config());
    housekeeper.trim_once();

    assert!(store.latest_seq(&thread.id).unwrap() > 0);
}
