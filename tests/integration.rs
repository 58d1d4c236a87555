use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use eventbus::{Bus, BusConfig, EventId, EventRecord, ListenerShared};

fn test_bus() -> Bus {
    Bus::init(BusConfig::default())
}

#[tokio::test]
async fn simple_pub_sub_delivers_callback() {
    let bus = test_bus();
    let received = Arc::new(AtomicU32::new(0));
    let received_clone = received.clone();
    let listener = ListenerShared::callback(
        move |event| {
            let value = u32::from_le_bytes(event.payload().try_into().unwrap());
            received_clone.store(value, Ordering::SeqCst);
        },
        Some("l1".to_string()),
    );

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener, EventId(1)).await.unwrap();

    let event = EventRecord::new_static(EventId(1), 0, 0xDEADBEEFu32.to_le_bytes().to_vec());
    bus.publish(event, false).await.unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 0xDEADBEEF);
}

#[tokio::test]
async fn high_bit_event_id_is_addressable() {
    let bus = test_bus();
    let received = Arc::new(AtomicU32::new(0));
    let received_clone = received.clone();
    let listener = ListenerShared::callback(
        move |event| {
            let value = u32::from_le_bytes(event.payload().try_into().unwrap());
            received_clone.store(value, Ordering::SeqCst);
        },
        None,
    );

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener, EventId(80)).await.unwrap();

    let event = EventRecord::new_static(EventId(80), 0, 0xBEEF0BEEu32.to_le_bytes().to_vec());
    bus.publish(event, false).await.unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 0xBEEF0BEE);
}

#[tokio::test]
async fn retained_event_redelivers_on_subscribe() {
    let bus = test_bus();
    let retained = EventRecord::new_static(EventId(1), 0, 0x1234u32.to_le_bytes().to_vec());
    bus.publish(retained, true).await.unwrap();

    let received = Arc::new(AtomicU32::new(0));
    let calls = Arc::new(AtomicU32::new(0));
    let (received_clone, calls_clone) = (received.clone(), calls.clone());
    let listener = ListenerShared::callback(
        move |event| {
            let value = u32::from_le_bytes(event.payload().try_into().unwrap());
            received_clone.store(value, Ordering::SeqCst);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        None,
    );

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener, EventId(1)).await.unwrap();

    assert_eq!(received.load(Ordering::SeqCst), 0x1234);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidate_clears_retained_event() {
    let bus = test_bus();
    let retained = EventRecord::new_static(EventId(1), 0, 0x1234u32.to_le_bytes().to_vec());
    bus.publish(retained, true).await.unwrap();
    bus.invalidate(EventId(1)).await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let listener = ListenerShared::callback(move |_event| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    }, None);

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener, EventId(1)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn filtered_delivery_only_matches_subscribed_ids() {
    let bus = test_bus();
    let results: Arc<parking_lot::Mutex<[u8; 5]>> = Arc::new(parking_lot::Mutex::new([0; 5]));
    let results_clone = results.clone();
    let listener = ListenerShared::callback(
        move |event| {
            let id = event.id().0 as usize;
            results_clone.lock()[id] = event.payload()[0];
        },
        None,
    );

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener.clone(), EventId(1)).await.unwrap();
    bus.subscribe(listener, EventId(4)).await.unwrap();

    for (id, value) in [(1u32, 0xE1u8), (2, 0xE2), (3, 0xE3), (4, 0xE4)] {
        let event = EventRecord::new_static(EventId(id), 0, vec![value]);
        bus.publish(event, false).await.unwrap();
    }

    let snapshot = *results.lock();
    assert_eq!(snapshot[1], 0xE1);
    assert_eq!(snapshot[4], 0xE4);
    assert_eq!(snapshot[2], 0);
    assert_eq!(snapshot[3], 0);
}

#[tokio::test]
async fn queue_mode_fan_out_bumps_and_releases_refcount() {
    let bus = test_bus();
    let (l1, mut rx1) = ListenerShared::queue(4, Some("l1".to_string()));
    let (l2, mut rx2) = ListenerShared::queue(4, Some("l2".to_string()));

    bus.attach(l1.clone()).await.unwrap();
    bus.attach(l2.clone()).await.unwrap();
    bus.subscribe(l1.clone(), EventId(1)).await.unwrap();
    bus.subscribe(l2.clone(), EventId(1)).await.unwrap();

    let event = bus.event_alloc(EventId(1), 7, vec![0xAA]).unwrap();
    bus.publish(event, false).await.unwrap();

    let received1 = rx1.recv().await.unwrap();
    let received2 = rx2.recv().await.unwrap();
    assert_eq!(received1.ref_count(), 2);
    assert_eq!(received2.ref_count(), 2);

    bus.event_release(&received1, &l1).unwrap();
    assert_eq!(received2.ref_count(), 1);
    bus.event_release(&received2, &l2).unwrap();
    assert_eq!(received2.ref_count(), 0);
}

#[tokio::test]
async fn publish_from_isr_delivers_without_waiting() {
    let bus = test_bus();
    let received = Arc::new(AtomicU32::new(0));
    let received_clone = received.clone();
    let listener = ListenerShared::callback(
        move |event| {
            let value = u32::from_le_bytes(event.payload().try_into().unwrap());
            received_clone.store(value, Ordering::SeqCst);
        },
        None,
    );

    bus.attach(listener.clone()).await.unwrap();
    bus.subscribe(listener, EventId(1)).await.unwrap();

    let event = EventRecord::new_static(EventId(1), 0, 0xBEEFu32.to_le_bytes().to_vec());
    assert!(bus.publish_from_isr(event));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(received.load(Ordering::SeqCst), 0xBEEF);
}

#[tokio::test]
async fn wait_event_succeeds_when_published_in_time() {
    let bus = test_bus();
    let bus_clone = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let event = EventRecord::new_static(EventId(1), 0, vec![]);
        bus_clone.publish(event, false).await.unwrap();
    });

    let passed = bus.wait_event(EventId(1), Duration::from_millis(500)).await.unwrap();
    assert!(passed);
}

#[tokio::test]
async fn wait_event_fails_on_timeout() {
    let bus = test_bus();
    let bus_clone = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let event = EventRecord::new_static(EventId(1), 0, vec![]);
        bus_clone.publish(event, false).await.unwrap();
    });

    let passed = bus.wait_event(EventId(2), Duration::from_millis(200)).await.unwrap();
    assert!(!passed);
}
