use locopilot::Config;

#[test]
fn empty_file_yields_documented_defaults() {
    let parsed: Config = toml::from_str("").expect("empty config should deserialize");

    assert_eq!(parsed.log_level, "info");
    assert_eq!(parsed.reviews.poll_interval_secs, 600);
    assert_eq!(parsed.reviews.inter_reply_delay_ms, 2_000);
    assert_eq!(parsed.recovery.interval_secs, 300);
    assert_eq!(parsed.recovery.failure_cooldown_secs, 900);
    assert_eq!(parsed.recovery.activity_retention, 500);
    assert_eq!(parsed.credentials.refresh_buffer_minutes, 30);
    assert!(!parsed.credentials.allow_pool_fallback);
    assert_eq!(parsed.entitlement.default_trial_days, 7);
    assert_eq!(parsed.content.min_words, 20);
    assert_eq!(parsed.content.max_words, 300);
    assert!(parsed.secrets.encrypt);
    parsed.validate().expect("defaults should validate");
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let toml = r#"
log_level = "debug"

[scheduler]
test_interval_secs = 5

[credentials]
allow_pool_fallback = true

[entitlement]
admin_principals = ["ops-1"]
"#;

    let parsed: Config = toml::from_str(toml).expect("partial config should deserialize");
    assert_eq!(parsed.log_level, "debug");
    assert_eq!(parsed.scheduler.test_interval_secs, 5);
    assert_eq!(parsed.scheduler.sync_interval_secs, 60);
    assert!(parsed.credentials.allow_pool_fallback);
    assert_eq!(parsed.credentials.cache_ttl_secs, 90);
    assert_eq!(parsed.entitlement.admin_principals, vec!["ops-1".to_string()]);
}

#[test]
fn hot_review_polling_fails_validation() {
    let parsed: Config = toml::from_str("[reviews]\npoll_interval_secs = 2\n").unwrap();
    let err = parsed.validate().unwrap_err();
    assert!(err.to_string().contains("poll_interval_secs"));
}
