//! Command routing across several instances.

mod common;

use nwmon_monitor::dispatch::ServiceDispatcher;
use nwmon_monitor::error::MonitorError;

use common::{ip, Harness, MemoryStore};

const MAC: &str = "aa:bb:cc:00:11:22";

async fn two_instances() -> (Harness, Harness, ServiceDispatcher) {
    let home = Harness::new("home", "192.168.50.0/29", MemoryStore::default()).await;
    let lab = Harness::new("lab", "192.168.50.8/29", MemoryStore::default()).await;

    home.prober.set_up(ip(2), 1.0);
    home.enricher.set_mac(ip(2), MAC);
    lab.prober.set_up(ip(10), 4.0);

    let dispatcher = ServiceDispatcher::new(vec![home.coordinator.clone(), lab.coordinator.clone()]);
    dispatcher.full_scan().await;
    (home, lab, dispatcher)
}

#[tokio::test]
async fn test_full_scan_reaches_every_instance() {
    let (home, lab, dispatcher) = two_instances().await;

    let snapshots = dispatcher.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].instance, "home");
    assert_eq!(snapshots[0].total_count, 1);
    assert_eq!(snapshots[1].instance, "lab");
    assert_eq!(snapshots[1].total_count, 1);

    assert!(home.store.saved().is_some());
    assert!(lab.store.saved().is_some());
}

#[tokio::test]
async fn test_forget_accepts_any_mac_notation() {
    let (home, _lab, dispatcher) = two_instances().await;

    let record = dispatcher.forget_device("AABBCC001122").await.unwrap();
    assert_eq!(record.ip, ip(2));
    assert_eq!(home.coordinator.snapshot().total_count, 0);
    assert!(home.store.saved().unwrap().devices.is_empty());

    let err = dispatcher.forget_device("aa-bb-cc-00-11-22").await.unwrap_err();
    assert!(matches!(err, MonitorError::NotFound(_)));
}

#[tokio::test]
async fn test_watch_routes_to_owning_instance() {
    let (home, lab, dispatcher) = two_instances().await;

    let record = dispatcher.watch_device("192.168.50.10", true).await.unwrap();
    assert!(record.watched);
    assert!(lab.coordinator.device("192.168.50.10").await.unwrap().watched);
    assert!(!home.coordinator.device(MAC).await.unwrap().watched);

    let record = dispatcher.watch_device("192.168.50.10", false).await.unwrap();
    assert!(!record.watched);
}

#[tokio::test]
async fn test_mac_device_resolves_by_ip() {
    let (home, _lab, dispatcher) = two_instances().await;
    dispatcher.watch_device("192.168.50.2", true).await.unwrap();
    assert!(home.coordinator.device(MAC).await.unwrap().watched);
}

#[tokio::test]
async fn test_unknown_device_mutates_nothing() {
    let (home, lab, dispatcher) = two_instances().await;
    let home_saves = home.store.saves.load(std::sync::atomic::Ordering::SeqCst);

    assert!(dispatcher
        .watch_device("10.9.9.9", true)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(dispatcher
        .name_device("de:ad:be:ef:00:01", Some("x".to_string()))
        .await
        .unwrap_err()
        .is_not_found());

    assert_eq!(home.store.saves.load(std::sync::atomic::Ordering::SeqCst), home_saves);
    assert_eq!(home.coordinator.snapshot().total_count, 1);
    assert_eq!(lab.coordinator.snapshot().total_count, 1);
}

#[tokio::test]
async fn test_name_device_sets_and_clears() {
    let (home, _lab, dispatcher) = two_instances().await;

    let record = dispatcher
        .name_device(MAC, Some("Kitchen speaker".to_string()))
        .await
        .unwrap();
    assert_eq!(record.display_name(), "Kitchen speaker");
    assert_eq!(
        home.coordinator.snapshot().device(MAC).unwrap().display_name,
        "Kitchen speaker"
    );

    let record = dispatcher.name_device(MAC, None).await.unwrap();
    assert_eq!(record.display_name(), "aabbcc001122");
}
