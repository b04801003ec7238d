use crate::support::{RecordingDelivery, Workspace, daily_location, eventually};
use chrono::{Duration, Utc};
use locopilot::automation::ConfigUpdate;
use locopilot::delivery::Protocol;
use locopilot::entitlement::SubscriptionStatus;

#[tokio::test]
async fn startup_catches_up_a_missed_slot_exactly_once() {
    let ws = Workspace::new().await;
    let primary = RecordingDelivery::new(Protocol::Primary, std::time::Duration::from_millis(200));
    let engine = ws.engine_with(primary.clone());
    ws.subscribe("p-1", SubscriptionStatus::Active, None).await;
    ws.connect(&engine, "p-1", Duration::days(1)).await;

    let last_run = Utc::now() - Duration::days(3);
    ws.add_location(&daily_location("loc-1", "p-1", Some(last_run)))
        .await;

    // The startup pass, the freshly installed timer and a recovery tick all
    // race for the same slot.
    let (started, reconciled) = tokio::join!(engine.start(), engine.reconcile());
    started.unwrap();
    reconciled.unwrap();
    assert!(eventually(std::time::Duration::from_secs(2), || primary.post_count() == 1).await);
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert_eq!(primary.post_count(), 1);

    let stored = ws.load("loc-1").await;
    assert!(stored.posting.last_run_at.unwrap() > last_run);

    let status = engine.get_status("loc-1").await.unwrap();
    assert!(status.timer_active);
    assert!(status.next_due_at.unwrap() > Utc::now());
    engine.shutdown();
}

#[tokio::test]
async fn test_interval_timer_posts_until_the_location_is_disabled() {
    let mut ws = Workspace::new().await;
    ws.config.scheduler.test_interval_secs = 1;
    let primary = RecordingDelivery::new(Protocol::Primary, std::time::Duration::ZERO);
    let engine = ws.engine_with(primary.clone());
    ws.subscribe("p-1", SubscriptionStatus::Active, None).await;
    ws.connect(&engine, "p-1", Duration::days(1)).await;

    let update: ConfigUpdate = serde_json::from_value(serde_json::json!({
        "principalId": "p-1",
        "posting": {
            "enabled": true,
            "frequency": "test",
            "business": {"name": "Harbor Tea House", "address": "12 Pier Road"}
        }
    }))
    .unwrap();
    engine.update_config("loc-1", update).await.unwrap();

    assert!(
        eventually(std::time::Duration::from_secs(8), || primary.post_count() >= 2).await,
        "timer should have fired at least twice"
    );

    engine.disable_location("loc-1").await.unwrap();
    let settled = primary.post_count();
    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
    assert_eq!(primary.post_count(), settled);
    assert_eq!(engine.active_timers(), 0);
    engine.shutdown();
}
