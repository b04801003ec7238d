//! Deterministic adapters and seeding helpers for engine-level tests.

use super::{Engine, EngineParts};
use crate::automation::{
    AutomationConfig, AutomationRepository, BusinessMetadata, Frequency, PostingConfig,
    ReplyConfig, SchedulePolicy,
};
use crate::config::Config;
use crate::content::{CompletionRequest, ContentKind, ContentProvider};
use crate::credentials::{Credential, RefreshError, TokenGrant, TokenRefresher};
use crate::delivery::{
    DeliveryFuture, DeliveryProtocol, DeliveryTarget, DualProtocolDelivery, PostDraft, Protocol,
    Review,
};
use crate::entitlement::{Subscription, SubscriptionRepository, SubscriptionStatus};
use crate::security::SecretStore;
use crate::storage::Store;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub(crate) const POST_TEXT: &str = "Fresh sourdough and cardamom buns are out of the oven this \
    morning. Stop by before noon, bring a friend, and try our new cold brew while the bakery \
    is still warm and quiet.";

pub(crate) const REPLY_TEXT: &str = "Thank you so much for visiting us!";

#[derive(Default)]
pub(crate) struct StubContent {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl StubContent {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

impl ContentProvider for StubContent {
    fn name(&self) -> &str {
        "stub"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("stub provider unavailable");
            }
            Ok(match request.kind {
                ContentKind::Post => POST_TEXT.to_string(),
                ContentKind::ReviewReply => REPLY_TEXT.to_string(),
            })
        })
    }
}

pub(crate) struct StubDelivery {
    protocol: Protocol,
    posts: Mutex<Vec<PostDraft>>,
    replies: Mutex<Vec<(String, String)>>,
    reviews: Mutex<Vec<Review>>,
    publish_delay: Mutex<std::time::Duration>,
    fail: AtomicBool,
}

impl StubDelivery {
    pub(crate) fn new(protocol: Protocol) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            posts: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            reviews: Mutex::new(Vec::new()),
            publish_delay: Mutex::new(std::time::Duration::ZERO),
            fail: AtomicBool::new(false),
        })
    }

    pub(crate) fn posts(&self) -> Vec<PostDraft> {
        self.posts.lock().unwrap().clone()
    }

    pub(crate) fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub(crate) fn set_reviews(&self, reviews: Vec<Review>) {
        *self.reviews.lock().unwrap() = reviews;
    }

    pub(crate) fn set_publish_delay(&self, delay: std::time::Duration) {
        *self.publish_delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("stub {} endpoint refused", self.protocol);
        }
        Ok(())
    }
}

impl DeliveryProtocol for StubDelivery {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn publish_post<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        draft: &'a PostDraft,
    ) -> DeliveryFuture<'a, Option<String>> {
        Box::pin(async move {
            let delay = *self.publish_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            self.check()?;
            let mut posts = self.posts.lock().unwrap();
            posts.push(draft.clone());
            Ok(Some(format!("localPosts/{}", posts.len())))
        })
    }

    fn fetch_reviews<'a>(&'a self, _target: &'a DeliveryTarget) -> DeliveryFuture<'a, Vec<Review>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.reviews.lock().unwrap().clone())
        })
    }

    fn reply_to_review<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        review_id: &'a str,
        reply: &'a str,
    ) -> DeliveryFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.replies
                .lock()
                .unwrap()
                .push((review_id.to_string(), reply.to_string()));
            Ok(())
        })
    }
}

/// Seeded credentials are far from expiry, so a refresh means a bug.
pub(crate) struct NoRefresh;

impl TokenRefresher for NoRefresh {
    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshError>> + Send + 'a>> {
        Box::pin(async { Err(RefreshError::Transient("refresh not expected".into())) })
    }
}

pub(crate) fn review(review_id: &str, rating: u8) -> Review {
    Review {
        review_id: review_id.into(),
        reviewer_name: Some("Dana".into()),
        rating,
        comment: Some("Lovely place".into()),
        created_at: None,
        has_reply: false,
    }
}

pub(crate) fn location(
    location_id: &str,
    frequency: Frequency,
    last_run_at: Option<DateTime<Utc>>,
) -> AutomationConfig {
    AutomationConfig {
        location_id: location_id.into(),
        principal_id: "p-1".into(),
        account_id: Some("acc-1".into()),
        enabled: true,
        posting: PostingConfig {
            enabled: true,
            schedule: Some(SchedulePolicy {
                frequency,
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                timezone: chrono_tz::UTC,
            }),
            last_run_at,
            business: BusinessMetadata {
                name: "Blue Cafe".into(),
                category: "Bakery".into(),
                address: "1 Main St, Springfield".into(),
                website_url: Some("https://blue.cafe".into()),
                ..BusinessMetadata::default()
            },
        },
        reply: ReplyConfig::default(),
        disabled: None,
    }
}

pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config {
        workspace_dir: root.join("workspace"),
        config_path: root.join("config.toml"),
        ..Config::default()
    };
    config.reviews.inter_reply_delay_ms = 0;
    config.reviews.poll_interval_secs = 3_600;
    config
}

pub(crate) struct Harness {
    pub(crate) _tmp: TempDir,
    pub(crate) store: Store,
    pub(crate) engine: Engine,
    pub(crate) content: Arc<StubContent>,
    pub(crate) primary: Arc<StubDelivery>,
    pub(crate) legacy: Arc<StubDelivery>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let store = Store::open(&config.database_path()).await.unwrap();

        let content = Arc::new(StubContent::default());
        let primary = StubDelivery::new(Protocol::Primary);
        let legacy = StubDelivery::new(Protocol::Legacy);
        let engine = Engine::new(
            &config,
            &store,
            SecretStore::new(tmp.path(), false),
            EngineParts {
                content: content.clone(),
                delivery: DualProtocolDelivery::new(
                    primary.clone(),
                    legacy.clone(),
                    std::time::Duration::from_secs(5),
                ),
                refresher: Arc::new(NoRefresh),
            },
        );

        Self {
            _tmp: tmp,
            store,
            engine,
            content,
            primary,
            legacy,
        }
    }

    /// Paid-up principal with a long-lived credential.
    pub(crate) async fn seed_principal(&self, principal_id: &str) {
        self.seed_subscription(principal_id, SubscriptionStatus::Active, None)
            .await;
        let credential = Credential::new(
            principal_id,
            format!("token-{principal_id}"),
            Some("refresh".into()),
            Utc::now() + Duration::days(1),
        );
        self.engine
            .services()
            .credentials
            .save(&credential)
            .await
            .unwrap();
    }

    pub(crate) async fn seed_subscription(
        &self,
        principal_id: &str,
        status: SubscriptionStatus,
        period_end: Option<DateTime<Utc>>,
    ) {
        SubscriptionRepository::new(&self.store)
            .upsert(&Subscription {
                principal_id: principal_id.into(),
                status,
                period_end,
                created_at: Utc::now() - Duration::days(30),
            })
            .await
            .unwrap();
    }

    pub(crate) async fn seed_location(&self, config: &AutomationConfig) {
        AutomationRepository::new(&self.store)
            .upsert(config)
            .await
            .unwrap();
    }

    pub(crate) async fn load(&self, location_id: &str) -> AutomationConfig {
        AutomationRepository::new(&self.store)
            .get(location_id)
            .await
            .unwrap()
            .unwrap()
    }
}
