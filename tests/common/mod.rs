// Each integration binary uses a subset of these helpers
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    middleware,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    config::AppConfig,
    db,
    entities::{customer, customer::CustomerStatus, customer_address, product},
    events::{self, EventSender},
    handlers::AppServices,
    middleware_helpers::request_id_middleware,
    webhooks::SignatureVerifier,
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_storefront_test";

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database. The database file lives in a per-test temp directory so
/// tests can run in parallel without sharing state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::new_with_config(|_| {}).await
    }

    /// Construct a test application with configuration tweaks applied before
    /// services are built.
    pub async fn new_with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_file = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Send a request against the router, optionally with a JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Post raw bytes to the webhook endpoint with the given headers.
    pub async fn post_webhook_raw(
        &self,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/payment")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Post a payload to the webhook endpoint with a valid signature over the
    /// exact bytes being sent.
    pub async fn post_signed_webhook(&self, payload: &Value) -> axum::response::Response {
        let body = serde_json::to_vec(payload).expect("serialize webhook payload");
        let timestamp = Utc::now().timestamp().to_string();
        let signature = SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300).sign(&timestamp, &body);

        self.post_webhook_raw(
            body,
            &[("x-timestamp", &timestamp), ("x-signature", &signature)],
        )
        .await
    }

    pub async fn seed_customer(&self, email: &str) -> customer::Model {
        self.seed_customer_with_status(email, CustomerStatus::Active)
            .await
    }

    pub async fn seed_customer_with_status(
        &self,
        email: &str,
        status: CustomerStatus,
    ) -> customer::Model {
        let now = Utc::now();
        customer::ActiveModel {
            email: Set(email.to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("Customer".to_string()),
            phone: Set(None),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer")
    }

    pub async fn seed_address(&self, customer_id: i32, is_default: bool) -> customer_address::Model {
        let now = Utc::now();
        customer_address::ActiveModel {
            customer_id: Set(customer_id),
            line1: Set("12 Harbour Street".to_string()),
            line2: Set(None),
            city: Set("Wellington".to_string()),
            postal_code: Set("6011".to_string()),
            country: Set("NZ".to_string()),
            phone: Set(None),
            is_default: Set(is_default),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer address")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            name: Set(name.to_string()),
            sku: Set(None),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body should be valid json")
}

/// Build a `checkout.session.completed` event around the given metadata.
pub fn checkout_event(
    transaction_id: &str,
    email: Option<&str>,
    amount_total: Option<i64>,
    metadata: Value,
) -> Value {
    json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": transaction_id,
                "customer_email": email,
                "amount_total": amount_total,
                "currency": "usd",
                "metadata": metadata,
            }
        }
    })
}
