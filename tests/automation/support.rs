use chrono::{DateTime, Duration, NaiveTime, Utc};
use locopilot::Config;
use locopilot::automation::{
    AutomationConfig, AutomationRepository, BusinessMetadata, Frequency, PostingConfig,
    ReplyConfig, SchedulePolicy,
};
use locopilot::content::{CompletionRequest, ContentKind, ContentProvider};
use locopilot::credentials::{Credential, RefreshError, TokenGrant, TokenRefresher};
use locopilot::delivery::{
    DeliveryFuture, DeliveryProtocol, DeliveryTarget, DualProtocolDelivery, PostDraft, Protocol,
    Review,
};
use locopilot::engine::{Engine, EngineParts};
use locopilot::entitlement::{Subscription, SubscriptionRepository, SubscriptionStatus};
use locopilot::security::SecretStore;
use locopilot::storage::Store;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const POST_TEXT: &str = "Our patio is open again this week. Come by for a slow breakfast, \
    a fresh pot of tea and the first strawberries of the season, served until two every day.";

pub struct FixedContent;

impl ContentProvider for FixedContent {
    fn name(&self) -> &str {
        "fixed"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            Ok(match request.kind {
                ContentKind::Post => POST_TEXT.to_string(),
                ContentKind::ReviewReply => "Thanks for stopping by!".to_string(),
            })
        })
    }
}

/// Records every post it accepts; optionally slow, to widen race windows.
pub struct RecordingDelivery {
    protocol: Protocol,
    delay: std::time::Duration,
    posts: Mutex<Vec<PostDraft>>,
}

impl RecordingDelivery {
    pub fn new(protocol: Protocol, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            delay,
            posts: Mutex::new(Vec::new()),
        })
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

impl DeliveryProtocol for RecordingDelivery {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn publish_post<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        draft: &'a PostDraft,
    ) -> DeliveryFuture<'a, Option<String>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.posts.lock().unwrap().push(draft.clone());
            Ok(None)
        })
    }

    fn fetch_reviews<'a>(&'a self, _target: &'a DeliveryTarget) -> DeliveryFuture<'a, Vec<Review>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn reply_to_review<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        _review_id: &'a str,
        _reply: &'a str,
    ) -> DeliveryFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

pub struct NoRefresh;

impl TokenRefresher for NoRefresh {
    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshError>> + Send + 'a>> {
        Box::pin(async { Err(RefreshError::Transient("refresh not expected".into())) })
    }
}

pub struct Workspace {
    pub tmp: TempDir,
    pub config: Config,
    pub store: Store,
}

impl Workspace {
    pub async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config {
            workspace_dir: tmp.path().join("workspace"),
            config_path: tmp.path().join("config.toml"),
            ..Config::default()
        };
        config.reviews.inter_reply_delay_ms = 0;
        config.reviews.poll_interval_secs = 3_600;
        let store = Store::open(&config.database_path()).await.unwrap();
        Self { tmp, config, store }
    }

    /// An engine over stub adapters; `primary` receives every post.
    pub fn engine_with(&self, primary: Arc<RecordingDelivery>) -> Engine {
        let legacy = RecordingDelivery::new(Protocol::Legacy, std::time::Duration::ZERO);
        Engine::new(
            &self.config,
            &self.store,
            SecretStore::new(self.tmp.path(), false),
            EngineParts {
                content: Arc::new(FixedContent),
                delivery: DualProtocolDelivery::new(
                    primary,
                    legacy,
                    std::time::Duration::from_secs(5),
                ),
                refresher: Arc::new(NoRefresh),
            },
        )
    }

    pub async fn subscribe(
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

    pub async fn connect(&self, engine: &Engine, principal_id: &str, expires_in: Duration) {
        let credential = Credential::new(
            principal_id,
            format!("token-{principal_id}"),
            Some(format!("refresh-{principal_id}")),
            Utc::now() + expires_in,
        );
        engine
            .services()
            .credentials
            .save(&credential)
            .await
            .unwrap();
    }

    pub async fn add_location(&self, config: &AutomationConfig) {
        AutomationRepository::new(&self.store)
            .upsert(config)
            .await
            .unwrap();
    }

    pub async fn load(&self, location_id: &str) -> AutomationConfig {
        AutomationRepository::new(&self.store)
            .get(location_id)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn daily_location(
    location_id: &str,
    principal_id: &str,
    last_run_at: Option<DateTime<Utc>>,
) -> AutomationConfig {
    AutomationConfig {
        location_id: location_id.into(),
        principal_id: principal_id.into(),
        account_id: Some("accounts/77".into()),
        enabled: true,
        posting: PostingConfig {
            enabled: true,
            schedule: Some(SchedulePolicy {
                frequency: Frequency::Daily,
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                timezone: chrono_tz::UTC,
            }),
            last_run_at,
            business: BusinessMetadata {
                name: "Harbor Tea House".into(),
                category: "Cafe".into(),
                address: "12 Pier Road".into(),
                ..BusinessMetadata::default()
            },
        },
        reply: ReplyConfig::default(),
        disabled: None,
    }
}

/// Polls `check` every 50 ms until it holds or `within` elapses.
pub async fn eventually(within: std::time::Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    check()
}
