//! Common test utilities for algo-webhooks integration tests.
//!
//! Provides mock responders, fake collaborators, and fixtures for exercising
//! the delivery engine end to end without a real database.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use algo_webhooks::{
    Delivery, DeliveryLedger, HttpSender, InMemoryDeliveryLedger, InMemorySubscriptionStore,
    ScopeId, Subscription, SubscriptionStore, Timer, WebhookConfig, WebhookDispatcher,
    WebhookError,
};
use algo_webhooks::models::{DeliveryListQuery, DeliveryStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

static INIT: Once = Once::new();

/// Route delivery logs to the test writer when `RUST_LOG` is set.
pub fn init_tracing() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test secrets
pub const SECRET_1: &str = "whsec_test_secret_key_12345";
pub const SECRET_2: &str = "whsec_another_secret_67890";

/// Standard test scopes
pub const SCOPE_A: ScopeId = ScopeId(7);
pub const SCOPE_B: ScopeId = ScopeId(8);

/// Build an active subscription.
pub fn subscription(url: &str, events: &[&str], scope: Option<ScopeId>, secret: &str) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        url: url.to_string(),
        secret: secret.to_string(),
        events: events.iter().map(|e| e.to_string()).collect(),
        scope,
        active: true,
    }
}

/// Default config with test-friendly timeouts.
pub fn test_config() -> WebhookConfig {
    WebhookConfig::builder()
        .request_timeout(Duration::from_secs(5))
        .build()
        .expect("valid test config")
}

// ---------------------------------------------------------------------------
// TestEngine - dispatcher wired to in-memory stores
// ---------------------------------------------------------------------------

/// Dispatcher with in-memory stores, a real HTTP sender, and a recording timer.
pub struct TestEngine {
    pub store: Arc<InMemorySubscriptionStore>,
    pub ledger: Arc<InMemoryDeliveryLedger>,
    pub timer: Arc<RecordingTimer>,
    pub dispatcher: WebhookDispatcher,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: WebhookConfig) -> Self {
        init_tracing();
        let store = Arc::new(InMemorySubscriptionStore::new());
        let ledger = Arc::new(InMemoryDeliveryLedger::new());
        let timer = Arc::new(RecordingTimer::default());
        let sender = HttpSender::new(&config).expect("Failed to build HTTP sender");
        let dispatcher = WebhookDispatcher::new(
            store.clone(),
            ledger.clone(),
            Arc::new(sender),
            timer.clone(),
            &config,
        );

        Self {
            store,
            ledger,
            timer,
            dispatcher,
        }
    }

    /// Register a subscription and return it.
    pub async fn subscribe(&self, subscription: Subscription) -> Subscription {
        self.store.upsert(subscription.clone()).await;
        subscription
    }

    /// Every ledger row of one subscription.
    pub async fn deliveries_for(&self, subscription_id: Uuid) -> Vec<Delivery> {
        self.ledger
            .list_by_subscription(
                subscription_id,
                &DeliveryListQuery {
                    limit: i64::MAX,
                    offset: 0,
                    status: None,
                },
            )
            .await
            .expect("in-memory ledger never fails")
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// RecordingTimer - records backoff waits without sleeping
// ---------------------------------------------------------------------------

/// Timer that records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingTimer {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// Failing collaborators
// ---------------------------------------------------------------------------

/// Subscription store whose queries always fail.
pub struct UnreachableSubscriptionStore;

#[async_trait::async_trait]
impl SubscriptionStore for UnreachableSubscriptionStore {
    async fn find_active_by_event(
        &self,
        _event: &str,
        _scope: Option<ScopeId>,
    ) -> Result<Vec<Subscription>, WebhookError> {
        Err(WebhookError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<Subscription>, WebhookError> {
        Err(WebhookError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// Ledger that refuses to create rows for selected subscriptions.
pub struct FlakyLedger {
    inner: InMemoryDeliveryLedger,
    reject: HashSet<Uuid>,
}

impl FlakyLedger {
    pub fn rejecting(subscription_ids: &[Uuid]) -> Self {
        Self {
            inner: InMemoryDeliveryLedger::new(),
            reject: subscription_ids.iter().copied().collect(),
        }
    }

    pub async fn all(&self) -> Vec<Delivery> {
        self.inner.all().await
    }
}

#[async_trait::async_trait]
impl DeliveryLedger for FlakyLedger {
    async fn create(&self, delivery: &Delivery) -> Result<(), WebhookError> {
        if self.reject.contains(&delivery.subscription_id) {
            return Err(WebhookError::LedgerWrite("disk full".to_string()));
        }
        self.inner.create(delivery).await
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        self.inner.record_attempt(id, attempts, error_message).await
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        response_status: u16,
        response_body: &str,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        self.inner
            .mark_delivered(id, attempts, response_status, response_body, delivered_at)
            .await
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        attempts: i32,
        error_message: &str,
    ) -> Result<(), WebhookError> {
        self.inner.mark_failed(id, attempts, error_message).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Delivery>, WebhookError> {
        self.inner.find_by_id(id).await
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        query: &DeliveryListQuery,
    ) -> Result<Vec<Delivery>, WebhookError> {
        self.inner.list_by_subscription(subscription_id, query).await
    }

    async fn count_by_subscription(
        &self,
        subscription_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<i64, WebhookError> {
        self.inner.count_by_subscription(subscription_id, status).await
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    fn from_request(request: &Request) -> Self {
        Self {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body as UTF-8 text.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).expect("webhook bodies are UTF-8 JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

/// Verify the signature header of a captured request against its raw body.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    match request.header("x-webhook-signature") {
        Some(signature) => algo_webhooks::verify_signature(request.body_str(), signature, secret),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
    response_body: String,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 "ok".
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
            response_body: "ok".to_string(),
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.requests
            .lock()
            .unwrap()
            .push(CapturedRequest::from_request(request));
        ResponseTemplate::new(self.response_code).set_body_string(self.response_body.clone())
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    failures_before_success: usize,
    failure_code: u16,
    success_body: String,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200 "ok".
    pub fn fail_times(n: usize) -> Self {
        Self::fail_with_status(n, 500)
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: usize, failure_code: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            failures_before_success: n,
            failure_code,
            success_body: "ok".to_string(),
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Respond for FailingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut requests = self.requests.lock().unwrap();
        let n = requests.len();
        requests.push(CapturedRequest::from_request(request));
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200).set_body_string(self.success_body.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// FirstAttemptFailsResponder - fails every delivery's first attempt
// ---------------------------------------------------------------------------

/// Returns 500 when `X-Webhook-Attempt` is 1 and 200 otherwise.
#[derive(Clone, Default)]
pub struct FirstAttemptFailsResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FirstAttemptFailsResponder {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Respond for FirstAttemptFailsResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest::from_request(request);
        let first = captured.header("x-webhook-attempt") == Some("1");
        self.requests.lock().unwrap().push(captured);
        if first {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: 200,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}
