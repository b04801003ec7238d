use crate::support::{RecordingDelivery, Workspace, daily_location};
use chrono::{Duration, Utc};
use locopilot::AutomationError;
use locopilot::automation::DisableReason;
use locopilot::delivery::Protocol;
use locopilot::engine::PostOutcome;
use locopilot::entitlement::SubscriptionStatus;

#[tokio::test]
async fn expired_trial_disables_every_location_of_the_principal_only() {
    let ws = Workspace::new().await;
    let primary = RecordingDelivery::new(Protocol::Primary, std::time::Duration::ZERO);
    let engine = ws.engine_with(primary.clone());

    ws.subscribe("p-1", SubscriptionStatus::Trial, Some(Utc::now() - Duration::hours(1)))
        .await;
    ws.subscribe("p-2", SubscriptionStatus::Active, None).await;
    ws.connect(&engine, "p-1", Duration::days(1)).await;
    ws.connect(&engine, "p-2", Duration::days(1)).await;

    let mut with_replies = daily_location("loc-a", "p-1", None);
    with_replies.reply.enabled = true;
    ws.add_location(&with_replies).await;
    ws.add_location(&daily_location("loc-b", "p-1", None)).await;
    ws.add_location(&daily_location("loc-c", "p-2", None)).await;

    let err = engine.trigger_post_now("loc-a", None).await.unwrap_err();
    assert!(matches!(err, AutomationError::EntitlementDenied { .. }));
    assert_eq!(err.code(), "entitlement_denied");

    for location_id in ["loc-a", "loc-b"] {
        let stored = ws.load(location_id).await;
        assert!(!stored.posting.enabled, "{location_id} posting still on");
        assert!(!stored.reply.enabled, "{location_id} replies still on");
        assert_eq!(
            stored.disabled.map(|d| d.reason),
            Some(DisableReason::TrialExpired)
        );
    }
    assert!(ws.load("loc-c").await.posting.enabled);

    let outcome = engine.trigger_post_now("loc-c", None).await.unwrap();
    assert!(matches!(outcome, PostOutcome::Published { .. }));
    assert_eq!(primary.post_count(), 1);
    engine.shutdown();
}

#[tokio::test]
async fn renewal_restores_entitlement_disables_but_not_manual_ones() {
    let ws = Workspace::new().await;
    let primary = RecordingDelivery::new(Protocol::Primary, std::time::Duration::ZERO);
    let engine = ws.engine_with(primary.clone());

    ws.subscribe(
        "p-1",
        SubscriptionStatus::Active,
        Some(Utc::now() - Duration::days(2)),
    )
    .await;
    ws.connect(&engine, "p-1", Duration::days(1)).await;
    ws.add_location(&daily_location("loc-a", "p-1", None)).await;
    ws.add_location(&daily_location("loc-b", "p-1", None)).await;

    engine.disable_location("loc-b").await.unwrap();
    assert!(engine.trigger_post_now("loc-a", None).await.is_err());
    assert_eq!(
        ws.load("loc-a").await.disabled.map(|d| d.reason),
        Some(DisableReason::SubscriptionExpired)
    );

    ws.subscribe(
        "p-1",
        SubscriptionStatus::Active,
        Some(Utc::now() + Duration::days(30)),
    )
    .await;
    assert_eq!(engine.sync().await.unwrap(), 1);

    let renewed = ws.load("loc-a").await;
    assert!(renewed.posting.enabled);
    assert!(renewed.disabled.is_none());
    let manual = ws.load("loc-b").await;
    assert_eq!(manual.disabled.map(|d| d.reason), Some(DisableReason::Manual));

    assert!(engine.get_status("loc-a").await.unwrap().timer_active);
    assert!(!engine.get_status("loc-b").await.unwrap().timer_active);
    engine.shutdown();
}
