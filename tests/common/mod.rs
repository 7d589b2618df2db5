#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::{Duration, NaiveDate, Utc};
use gudang_po_api::{
    app_router,
    auth::{Claims, TokenVerifier},
    config::AppConfig,
    db,
    entities::{
        delivery_note::{self, DeliveryNoteStatus},
        production_progress,
        purchase_order::{self, Priority, PurchaseOrderStatus},
        purchase_order_item::{self, ItemStatus},
        warehouse,
    },
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Application state and router backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub upload_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let upload_dir = tempfile::tempdir().expect("create upload dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // a single connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.upload_dir = upload_dir.path().to_string_lossy().into_owned();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            upload_dir,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub fn token_for(&self, user_id: i64) -> String {
        TokenVerifier::new(JWT_SECRET)
            .sign(&Claims::for_user(user_id, Duration::hours(1)))
            .expect("sign test token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user_id: Option<i64>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(user_id) = user_id {
            builder = builder.header("authorization", format!("Bearer {}", self.token_for(user_id)));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_warehouse(&self, name: &str, manager_id: Option<i64>) -> warehouse::Model {
        let now = Utc::now();
        warehouse::ActiveModel {
            name: Set(name.to_string()),
            location: Set(Some(format!("Lokasi {}", name))),
            manager_id: Set(manager_id),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed warehouse")
    }

    pub async fn seed_purchase_order(
        &self,
        po_number: &str,
        primary_warehouse_id: i64,
        status: PurchaseOrderStatus,
    ) -> purchase_order::Model {
        let now = Utc::now();
        purchase_order::ActiveModel {
            po_number: Set(po_number.to_string()),
            quotation_id: Set(None),
            status: Set(status),
            priority: Set(Priority::Medium),
            primary_warehouse_id: Set(primary_warehouse_id),
            po_date: Set(NaiveDate::from_ymd_opt(2025, 3, 1)),
            target_date: Set(NaiveDate::from_ymd_opt(2025, 3, 31)),
            note: Set(None),
            created_by: Set(1),
            approved_by: Set(None),
            approved_at: Set(None),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed purchase order")
    }

    pub async fn seed_item(
        &self,
        purchase_order_id: i64,
        product_name: &str,
        qty: i32,
        warehouse_id: Option<i64>,
    ) -> purchase_order_item::Model {
        let now = Utc::now();
        purchase_order_item::ActiveModel {
            purchase_order_id: Set(purchase_order_id),
            product_name: Set(product_name.to_string()),
            product_data: Set(Some(r#"{"sku":"PV-3IN"}"#.to_string())),
            qty: Set(qty),
            unit_price: Set(Decimal::new(12_500, 0)),
            line_total: Set(Decimal::new(12_500, 0) * Decimal::from(qty)),
            warehouse_id: Set(warehouse_id),
            priority: Set(Priority::Medium),
            note: Set(None),
            target_date: Set(None),
            status: Set(ItemStatus::Pending),
            started_at: Set(None),
            completed_at: Set(None),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed purchase order item")
    }

    /// Inserts a progress row dated `minutes_ago` in the past.
    pub async fn seed_progress(
        &self,
        item_id: i64,
        warehouse_id: i64,
        qty_completed: i32,
        qty_target: i32,
        minutes_ago: i64,
    ) -> production_progress::Model {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        production_progress::ActiveModel {
            item_id: Set(item_id),
            warehouse_id: Set(warehouse_id),
            qty_completed: Set(qty_completed),
            qty_target: Set(qty_target),
            note: Set(None),
            is_transfer_destination: Set(false),
            released_to: Set(None),
            updated_by: Set(1),
            progress_date: Set(at),
            created_at: Set(at),
            updated_at: Set(at),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed progress")
    }

    /// Inserts a delivery note with the given `(item, warehouse, qty)` lines.
    pub async fn seed_delivery_note(
        &self,
        order: &purchase_order::Model,
        note_number: &str,
        lines: &[(i64, i64, i64)],
        is_deleted: bool,
    ) -> delivery_note::Model {
        let now = Utc::now();
        let lines: Vec<Value> = lines
            .iter()
            .map(|(item_id, warehouse_id, qty)| {
                serde_json::json!({
                    "item_id": item_id,
                    "warehouse_id": warehouse_id,
                    "qty_shipped": qty,
                })
            })
            .collect();
        delivery_note::ActiveModel {
            note_number: Set(note_number.to_string()),
            purchase_order_id: Set(order.id),
            po_number: Set(order.po_number.clone()),
            destination_address: Set("Jl. Industri 5, Bekasi".to_string()),
            note: Set(None),
            lines: Set(Value::Array(lines).to_string()),
            documentation: Set("[]".to_string()),
            author_id: Set(1),
            delivery_date: Set(Utc::now().date_naive()),
            status: Set(DeliveryNoteStatus::Draft),
            is_deleted: Set(is_deleted),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed delivery note")
    }

    pub async fn reload_item(&self, id: i64) -> purchase_order_item::Model {
        purchase_order_item::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load item")
            .expect("item exists")
    }

    /// Every progress row of an item, oldest insert first.
    pub async fn progress_for_item(&self, item_id: i64) -> Vec<production_progress::Model> {
        production_progress::Entity::find()
            .filter(production_progress::Column::ItemId.eq(item_id))
            .order_by_asc(production_progress::Column::Id)
            .all(self.db())
            .await
            .expect("load progress rows")
    }

    pub async fn reload_order(&self, id: i64) -> purchase_order::Model {
        purchase_order::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load purchase order")
            .expect("purchase order exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&body).expect("response body is json")
}
