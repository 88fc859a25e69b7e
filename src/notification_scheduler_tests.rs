use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use super::*;

struct RecordingTarget {
    seen: AsyncMutex<Vec<(String, String)>>,
    calls: AtomicUsize,
}

impl RecordingTarget {
    fn new() -> Self {
        Self { seen: AsyncMutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }
}

impl NotificationTarget for RecordingTarget {
    fn run_notification<'a>(&'a self, parent_id: String, notification: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.seen.lock().await.push((parent_id, notification));
        })
    }
}

#[tokio::test]
async fn notifications_for_a_parent_are_delivered_in_order() {
    let scheduler = NotificationScheduler::new();
    let target = Arc::new(RecordingTarget::new());
    scheduler.wire_target(Arc::clone(&target) as Arc<dyn NotificationTarget>);

    scheduler.enqueue("p1", "first".into());
    scheduler.enqueue("p1", "second".into());
    scheduler.enqueue("p1", "third".into());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = target.seen.lock().await;
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], ("p1".to_string(), "first".to_string()));
    assert_eq!(seen[1], ("p1".to_string(), "second".to_string()));
    assert_eq!(seen[2], ("p1".to_string(), "third".to_string()));
}

#[tokio::test]
async fn distinct_parents_get_independent_queues() {
    let scheduler = NotificationScheduler::new();
    let target = Arc::new(RecordingTarget::new());
    scheduler.wire_target(Arc::clone(&target) as Arc<dyn NotificationTarget>);

    scheduler.enqueue("a", "a1".into());
    scheduler.enqueue("b", "b1".into());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(target.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancel_parent_stops_its_worker() {
    let scheduler = NotificationScheduler::new();
    let target = Arc::new(RecordingTarget::new());
    scheduler.wire_target(Arc::clone(&target) as Arc<dyn NotificationTarget>);

    scheduler.enqueue("p1", "first".into());
    assert!(scheduler.has_pending("p1"));
    scheduler.cancel_parent("p1");
    assert!(!scheduler.has_pending("p1"));
}
