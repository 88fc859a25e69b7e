use super::*;
use crate::model::NewThread;

fn bus() -> (EventBus, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    (EventBus::new(Arc::clone(&store)), store)
}

#[tokio::test]
async fn publish_assigns_seq_and_fans_out() {
    let (bus, store) = bus();
    let thread = store.create_thread(NewThread { title: "T1".into(), ..Default::default() }).unwrap();
    let sub = bus.subscribe(&thread.id, None).unwrap();
    let mut receiver = sub.receiver;
    let seq = bus.publish(&thread.id, ThreadEvent::TextDelta { content: "hi".into() }).await.unwrap();
    let delivered = receiver.recv().await.unwrap();
    assert_eq!(delivered.seq, seq);
}

#[tokio::test]
async fn subscribe_replays_backlog_since_seq() {
    let (bus, store) = bus();
    let thread = store.create_thread(NewThread { title: "T1".into(), ..Default::default() }).unwrap();
    let s1 = bus.publish(&thread.id, ThreadEvent::TextDelta { content: "a".into() }).await.unwrap();
    let _s2 = bus.publish(&thread.id, ThreadEvent::TextDelta { content: "b".into() }).await.unwrap();
    let s3 = bus.publish(&thread.id, ThreadEvent::TextDelta { content: "c".into() }).await.unwrap();

    let sub = bus.subscribe(&thread.id, Some(s1)).unwrap();
    assert_eq!(sub.backlog.len(), 2);
    assert_eq!(sub.backlog[0].seq, s1 + 1);
    assert_eq!(sub.backlog[1].seq, s3);
}

#[tokio::test]
async fn reconnect_since_last_seq_delivers_exactly_new_events() {
    let (bus, store) = bus();
    let thread = store.create_thread(NewThread { title: "T1".into(), ..Default::default() }).unwrap();
    let last_seq = bus.publish(&thread.id, ThreadEvent::TextDelta { content: "a".into() }).await.unwrap();
    for i in 0..3 {
        bus.publish(&thread.id, ThreadEvent::TextDelta { content: format!("delta{i}") }).await.unwrap();
    }
    let sub = bus.subscribe(&thread.id, Some(last_seq)).unwrap();
    assert_eq!(sub.backlog.len(), 3);
}

#[tokio::test]
async fn close_thread_emits_shutdown_to_subscribers() {
    let (bus, store) = bus();
    let thread = store.create_thread(NewThread { title: "T1".into(), ..Default::default() }).unwrap();
    let sub = bus.subscribe(&thread.id, None).unwrap();
    let mut receiver = sub.receiver;
    bus.close_thread(&thread.id);
    let delivered = receiver.recv().await.unwrap();
    assert!(matches!(delivered.event, ThreadEvent::Shutdown {}));
}
