use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    auth::{WarehouseAccess, WarehouseScope},
    db::DbPool,
    entities::{
        delivery_note::DeliveryNoteStatus,
        production_progress,
        purchase_order::{self, Priority, PurchaseOrderStatus},
        purchase_order_item::{self, ItemStatus},
        warehouse,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        conservation::{check_note, check_progress_entry, entry_target, max_qty_for_warehouse, plan_transfer},
        lifecycle::{available_actions, check_transition, PurchaseOrderAction},
        progress::{derive_item_status, next_item_status, progress_percentage, LatestProgressView},
        shipment::{available_shipments, shipped_quantities, AvailableShipment},
    },
};

use super::{delivery_notes::DeliveryNoteView, locks::KeyedLocks, lookup};

/// Result of recording production progress for an item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub qty_completed: i64,
    pub total_completed: i64,
    pub percentage: i64,
    pub status: ItemStatus,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_warehouse_id: i64,
    pub to_warehouse_id: i64,
    pub qty: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub item_id: i64,
    pub qty_transferred: i64,
    pub from_warehouse_id: i64,
    pub from_warehouse: String,
    pub to_warehouse_id: i64,
    pub to_warehouse: String,
    pub total_completed: i64,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseRef {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
}

impl From<&warehouse::Model> for WarehouseRef {
    fn from(model: &warehouse::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            location: model.location.clone(),
        }
    }
}

/// Item counts by derived production status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total_items: usize,
    pub pending_items: usize,
    pub in_progress_items: usize,
    pub completed_items: usize,
    pub cancelled_items: usize,
}

impl StatusCounts {
    fn add(&mut self, status: ItemStatus) {
        self.total_items += 1;
        match status {
            ItemStatus::Pending => self.pending_items += 1,
            ItemStatus::InProgress => self.in_progress_items += 1,
            ItemStatus::Completed => self.completed_items += 1,
            ItemStatus::Cancelled => self.cancelled_items += 1,
        }
    }

    pub fn all_finished(&self) -> bool {
        self.pending_items == 0 && self.in_progress_items == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseProgress {
    pub id: i64,
    pub warehouse_id: i64,
    pub warehouse_name: Option<String>,
    pub qty_completed: i32,
    pub qty_target: i32,
    pub percentage: i64,
    pub is_transfer_destination: bool,
    pub released_to: Option<i64>,
    pub note: Option<String>,
    pub updated_by: i64,
    pub progress_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressHistoryEntry {
    #[serde(flatten)]
    pub entry: production_progress::Model,
    pub warehouse_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemComputed {
    pub current_warehouse_qty: i64,
    pub other_warehouses_total: i64,
    pub min_qty_for_current: i64,
    pub max_qty_for_current: i64,
    pub is_transfer_destination: bool,
    pub available_transfer_targets: Vec<WarehouseRef>,
    pub user_has_access_to_item_warehouse: bool,
    pub can_transfer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: i64,
    pub purchase_order_id: i64,
    pub product_name: String,
    pub product_data: serde_json::Value,
    pub qty: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub warehouse_id: Option<i64>,
    pub warehouse: Option<WarehouseRef>,
    pub priority: Priority,
    pub note: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub status: ItemStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub qty_completed: i64,
    pub qty_remaining: i64,
    pub progress_percentage: i64,
    pub progress_per_warehouse: Vec<WarehouseProgress>,
    pub history: Vec<ProgressHistoryEntry>,
    pub available_shipments: Vec<AvailableShipment>,
    pub computed: ItemComputed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub total_qty_target: i64,
    pub total_qty_completed: i64,
    pub total_qty_remaining: i64,
    pub total_qty_shipped: i64,
    pub total_unshipped: i64,
    /// Shipped share of the target, percent with one decimal.
    pub shipping_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiState {
    pub pending_items: usize,
    pub in_progress_items: usize,
    pub draft_delivery_notes: usize,
    pub can_complete: bool,
    pub has_available_shipments: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub primary_warehouse: Option<WarehouseRef>,
    pub items: Vec<ItemDetail>,
    pub summary: OrderSummary,
    pub stats: StatusCounts,
    pub delivery_notes: Vec<DeliveryNoteView>,
    pub available_actions: Vec<PurchaseOrderAction>,
    pub ui_state: UiState,
    pub warehouses: Vec<WarehouseRef>,
    pub user_warehouse_ids: Vec<i64>,
}

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Filters for [`PurchaseOrderService::list`].
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderQuery {
    /// Matches the PO number or the primary warehouse name.
    pub search: Option<String>,
    pub status: Option<PurchaseOrderStatus>,
    pub warehouse_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderListEntry {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub warehouse_name: Option<String>,
    pub total_items: usize,
    pub completed_items: usize,
    /// Share of items whose production is complete.
    pub progress_percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderPage {
    pub purchase_orders: Vec<PurchaseOrderListEntry>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Order counts per status across the caller's warehouses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurchaseOrderStats {
    pub total: u64,
    pub draft: u64,
    pub approved: u64,
    pub in_production: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub closed: u64,
    pub urgent: u64,
}

impl PurchaseOrderStats {
    fn add(&mut self, order: &purchase_order::Model) {
        self.total += 1;
        match order.status {
            PurchaseOrderStatus::Draft => self.draft += 1,
            PurchaseOrderStatus::Approved => self.approved += 1,
            PurchaseOrderStatus::InProduction => self.in_production += 1,
            PurchaseOrderStatus::Completed => self.completed += 1,
            PurchaseOrderStatus::Cancelled => self.cancelled += 1,
            PurchaseOrderStatus::Closed => self.closed += 1,
        }
        if order.priority == Priority::Urgent {
            self.urgent += 1;
        }
    }
}

/// Header fields editable while an order is a draft. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderChanges {
    pub primary_warehouse_id: Option<i64>,
    pub priority: Option<Priority>,
    pub note: Option<String>,
    pub target_date: Option<NaiveDate>,
}

impl PurchaseOrderChanges {
    fn is_empty(&self) -> bool {
        self.primary_warehouse_id.is_none()
            && self.priority.is_none()
            && self.note.is_none()
            && self.target_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOverview {
    #[serde(flatten)]
    pub item: purchase_order_item::Model,
    pub warehouse_name: Option<String>,
    pub qty_completed: i64,
    pub qty_remaining: i64,
    pub progress_percentage: i64,
}

/// Purchase order lifecycle and production bookkeeping.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    access: Arc<dyn WarehouseAccess>,
    item_locks: Arc<KeyedLocks<i64>>,
}

impl PurchaseOrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        access: Arc<dyn WarehouseAccess>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            access,
            item_locks: Arc::new(KeyedLocks::new()),
        }
    }

    async fn scope(&self, user_id: i64) -> Result<WarehouseScope, ServiceError> {
        WarehouseScope::resolve(self.access.as_ref(), user_id).await
    }

    #[instrument(skip(self))]
    pub async fn approve(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::Approve)
            .await
    }

    #[instrument(skip(self))]
    pub async fn start_production(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::StartProduction)
            .await
    }

    #[instrument(skip(self))]
    pub async fn complete_production(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::CompleteProduction)
            .await
    }

    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::Cancel)
            .await
    }

    #[instrument(skip(self))]
    pub async fn reactivate(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::Reactivate)
            .await
    }

    #[instrument(skip(self))]
    pub async fn close(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(purchase_order_id, user_id, PurchaseOrderAction::Close)
            .await
    }

    /// Applies `action` with a single conditional update guarded by the source states.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        purchase_order_id: i64,
        user_id: i64,
        action: PurchaseOrderAction,
    ) -> Result<purchase_order::Model, ServiceError> {
        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_order_access(&scope, &order)?;

        let target = match check_transition(order.status, action) {
            Ok(target) => target,
            Err(err) => {
                warn!(purchase_order_id, status = %order.status, %action, "purchase order transition rejected");
                return Err(err);
            }
        };

        if action == PurchaseOrderAction::CompleteProduction {
            let counts = derived_status_counts(db, order.id).await?;
            if !counts.all_finished() {
                warn!(
                    purchase_order_id,
                    pending = counts.pending_items,
                    in_progress = counts.in_progress_items,
                    "production not finished"
                );
                return Err(ServiceError::InvalidTransition(format!(
                    "cannot complete production: {} item(s) pending and {} item(s) in progress",
                    counts.pending_items, counts.in_progress_items
                )));
            }
        }

        let now = Utc::now();
        let mut changes = purchase_order::ActiveModel {
            status: Set(target),
            updated_at: Set(now),
            ..Default::default()
        };
        match action {
            PurchaseOrderAction::Approve => {
                changes.approved_by = Set(Some(user_id));
                changes.approved_at = Set(Some(now));
            }
            PurchaseOrderAction::Cancel => {
                changes.cancelled_by = Set(Some(user_id));
                changes.cancelled_at = Set(Some(now));
            }
            PurchaseOrderAction::Reactivate => {
                changes.cancelled_by = Set(None);
                changes.cancelled_at = Set(None);
            }
            _ => {}
        }

        let result = purchase_order::Entity::update_many()
            .set(changes)
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::IsDeleted.eq(false))
            .filter(purchase_order::Column::Status.is_in(action.sources().iter().copied()))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            // lost a race with another transition
            let current = lookup::find_purchase_order(db, order.id).await?;
            return Err(action.invalid_from(current.status));
        }

        let updated = lookup::find_purchase_order(db, order.id).await?;
        info!(
            purchase_order_id,
            from = %order.status,
            to = %updated.status,
            user_id,
            "purchase order status changed"
        );
        self.event_sender
            .send_or_log(Event::PurchaseOrderStatusChanged {
                purchase_order_id,
                from: order.status,
                to: updated.status,
                user_id,
            })
            .await;

        Ok(updated)
    }

    /// Records `qty_completed` for the item's current primary warehouse.
    #[instrument(skip(self, note))]
    pub async fn update_item_progress(
        &self,
        item_id: i64,
        user_id: i64,
        qty_completed: i64,
        note: Option<String>,
    ) -> Result<ProgressUpdate, ServiceError> {
        check_note(note.as_deref())?;

        let db = &*self.db_pool;
        let item = lookup::find_item(db, item_id).await?;
        let order = lookup::find_purchase_order(db, item.purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let _guard = self.item_locks.lock(item_id).await;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let item = lookup::find_item(&txn, item_id).await?;
        let warehouse_id = item.warehouse_id.ok_or_else(|| {
            ServiceError::validation(format!("item {} has no assigned warehouse", item_id))
        })?;
        let view = LatestProgressView::from_entries(lookup::progress_rows(&txn, &[item.id]).await?);

        if let Err(err) = check_progress_entry(&view, item.id, item.qty, warehouse_id, qty_completed) {
            warn!(item_id, warehouse_id, qty_completed, error = %err, "progress entry rejected");
            return Err(err);
        }
        let qty = to_quantity(qty_completed)?;

        let now = Utc::now();
        production_progress::ActiveModel {
            item_id: Set(item.id),
            warehouse_id: Set(warehouse_id),
            qty_completed: Set(qty),
            qty_target: Set(entry_target(&view, item.id, item.qty, warehouse_id)),
            note: Set(note),
            is_transfer_destination: Set(false),
            released_to: Set(None),
            updated_by: Set(user_id),
            progress_date: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let (total_completed, status) = refresh_item_status(&txn, item.clone(), None, now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            item_id,
            warehouse_id,
            qty_completed,
            total_completed,
            status = %status,
            "production progress recorded"
        );
        self.event_sender
            .send_or_log(Event::ProgressRecorded {
                item_id,
                warehouse_id,
                qty_completed: qty,
                total_completed,
                status,
                user_id,
            })
            .await;

        Ok(ProgressUpdate {
            item_id,
            warehouse_id,
            qty_completed,
            total_completed,
            percentage: progress_percentage(total_completed, item.qty),
            status,
        })
    }

    /// Moves outstanding quantity of an item from one warehouse to another.
    #[instrument(skip(self, request), fields(from = request.from_warehouse_id, to = request.to_warehouse_id, qty = request.qty))]
    pub async fn transfer_progress(
        &self,
        item_id: i64,
        user_id: i64,
        request: TransferRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        check_note(request.note.as_deref())?;

        let db = &*self.db_pool;
        let item = lookup::find_item(db, item_id).await?;
        let order = lookup::find_purchase_order(db, item.purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let _guard = self.item_locks.lock(item_id).await;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let item = lookup::find_item(&txn, item_id).await?;
        let view = LatestProgressView::from_entries(lookup::progress_rows(&txn, &[item.id]).await?);
        let plan = match plan_transfer(
            &view,
            item.id,
            item.qty,
            request.from_warehouse_id,
            request.to_warehouse_id,
            request.qty,
        ) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(item_id, error = %err, "transfer rejected");
                return Err(err);
            }
        };

        let from = lookup::find_warehouse(&txn, plan.from_warehouse_id).await?;
        let to = lookup::find_warehouse(&txn, plan.to_warehouse_id).await?;
        let qty = to_quantity(plan.qty)?;
        let now = Utc::now();
        let suffix = note_suffix(request.note.as_deref());

        match plan.source_entry.clone() {
            Some(source) => {
                let mut released: production_progress::ActiveModel = source.into();
                released.note = Set(Some(format!(
                    "Released remaining production to {}{}",
                    to.name, suffix
                )));
                released.released_to = Set(Some(to.id));
                released.updated_by = Set(user_id);
                released.progress_date = Set(now);
                released.updated_at = Set(now);
                released.update(&txn).await.map_err(ServiceError::db_error)?;
            }
            None => {
                production_progress::ActiveModel {
                    item_id: Set(item.id),
                    warehouse_id: Set(from.id),
                    qty_completed: Set(0),
                    qty_target: Set(qty),
                    note: Set(Some(format!("Released to {}{}", to.name, suffix))),
                    is_transfer_destination: Set(false),
                    released_to: Set(Some(to.id)),
                    updated_by: Set(user_id),
                    progress_date: Set(now),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            }
        }

        production_progress::ActiveModel {
            item_id: Set(item.id),
            warehouse_id: Set(to.id),
            qty_completed: Set(qty),
            qty_target: Set(qty),
            note: Set(Some(format!(
                "Transfer dari {} ({} qty){}",
                from.name, plan.qty, suffix
            ))),
            is_transfer_destination: Set(true),
            released_to: Set(None),
            updated_by: Set(user_id),
            progress_date: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let (total_completed, status) =
            refresh_item_status(&txn, item.clone(), Some(to.id), now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            item_id,
            from_warehouse_id = from.id,
            to_warehouse_id = to.id,
            qty = plan.qty,
            remaining_before = plan.remaining,
            superseded_destination_qty = plan.superseded_destination.as_ref().map(|e| e.qty_completed),
            status = %status,
            "production transferred"
        );
        self.event_sender
            .send_or_log(Event::ProductionTransferred {
                item_id,
                from_warehouse_id: from.id,
                to_warehouse_id: to.id,
                qty: plan.qty,
                user_id,
            })
            .await;

        Ok(TransferOutcome {
            item_id,
            qty_transferred: plan.qty,
            from_warehouse_id: from.id,
            from_warehouse: from.name,
            to_warehouse_id: to.id,
            to_warehouse: to.name,
            total_completed,
            status,
        })
    }

    /// Full production and shipping picture of one order.
    #[instrument(skip(self))]
    pub async fn get_detail(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let warehouses = lookup::active_warehouses(db).await?;
        let names = lookup::warehouse_names(&warehouses);
        let items = lookup::items_for_order(db, order.id).await?;
        let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let rows = lookup::progress_rows(db, &item_ids).await?;
        let view = LatestProgressView::from_entries(rows.iter().cloned());
        let notes = lookup::delivery_notes_for_order(db, order.id).await?;
        let shipped = shipped_quantities(&notes);
        let available = available_shipments(&view, &items, &shipped, &names);

        let mut history_by_item: HashMap<i64, Vec<ProgressHistoryEntry>> = HashMap::new();
        for row in rows {
            history_by_item
                .entry(row.item_id)
                .or_default()
                .push(ProgressHistoryEntry {
                    warehouse_name: names.get(&row.warehouse_id).cloned(),
                    entry: row,
                });
        }

        let mut stats = StatusCounts::default();
        let mut summary = OrderSummary {
            total_qty_target: 0,
            total_qty_completed: 0,
            total_qty_remaining: 0,
            total_qty_shipped: 0,
            total_unshipped: 0,
            shipping_progress: 0.0,
        };

        let mut details = Vec::with_capacity(items.len());
        for item in items {
            let target = i64::from(item.qty);
            let completed = view.total_for_item(item.id);
            let status = next_item_status(item.status, completed, item.qty);
            stats.add(status);

            let shipped_for_item: i64 = shipped
                .iter()
                .filter(|((item_id, _), _)| *item_id == item.id)
                .map(|(_, qty)| *qty)
                .sum();
            summary.total_qty_target += target;
            summary.total_qty_completed += completed;
            summary.total_qty_shipped += shipped_for_item.min(completed);

            let progress_per_warehouse = view
                .entries_for_item(item.id)
                .map(|entry| WarehouseProgress {
                    id: entry.id,
                    warehouse_id: entry.warehouse_id,
                    warehouse_name: names.get(&entry.warehouse_id).cloned(),
                    qty_completed: entry.qty_completed,
                    qty_target: entry.qty_target,
                    percentage: progress_percentage(i64::from(entry.qty_completed), item.qty),
                    is_transfer_destination: entry.is_transfer_destination,
                    released_to: entry.released_to,
                    note: entry.note.clone(),
                    updated_by: entry.updated_by,
                    progress_date: entry.progress_date,
                })
                .collect::<Vec<_>>();

            let computed = item_computed(&view, &item, &warehouses, &scope);
            let percentage = progress_percentage(completed, item.qty);

            details.push(ItemDetail {
                id: item.id,
                purchase_order_id: item.purchase_order_id,
                product_data: item
                    .product_data
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(serde_json::Value::Null),
                product_name: item.product_name.clone(),
                qty: item.qty,
                unit_price: item.unit_price,
                line_total: item.line_total,
                warehouse_id: item.warehouse_id,
                warehouse: item
                    .warehouse_id
                    .and_then(|id| warehouses.iter().find(|w| w.id == id))
                    .map(WarehouseRef::from),
                priority: item.priority,
                note: item.note.clone(),
                target_date: item.target_date,
                status,
                started_at: item.started_at,
                completed_at: item.completed_at,
                qty_completed: completed,
                qty_remaining: (target - completed).max(0),
                progress_percentage: percentage,
                progress_per_warehouse,
                history: history_by_item.remove(&item.id).unwrap_or_default(),
                available_shipments: available
                    .iter()
                    .filter(|entry| entry.item_id == item.id)
                    .cloned()
                    .collect(),
                computed,
            });
        }

        summary.total_qty_remaining = (summary.total_qty_target - summary.total_qty_completed).max(0);
        summary.total_unshipped = (summary.total_qty_completed - summary.total_qty_shipped).max(0);
        summary.shipping_progress = shipping_progress(summary.total_qty_shipped, summary.total_qty_target);

        let can_complete = order.status == PurchaseOrderStatus::InProduction && stats.all_finished();
        let delivery_notes: Vec<DeliveryNoteView> =
            notes.into_iter().map(DeliveryNoteView::from).collect();
        let ui_state = UiState {
            pending_items: stats.pending_items,
            in_progress_items: stats.in_progress_items,
            draft_delivery_notes: delivery_notes
                .iter()
                .filter(|note| note.status == DeliveryNoteStatus::Draft)
                .count(),
            can_complete,
            has_available_shipments: !available.is_empty(),
        };

        Ok(PurchaseOrderDetail {
            primary_warehouse: warehouses
                .iter()
                .find(|w| w.id == order.primary_warehouse_id)
                .map(WarehouseRef::from),
            available_actions: available_actions(order.status, can_complete),
            purchase_order: order,
            items: details,
            summary,
            stats,
            delivery_notes,
            ui_state,
            warehouses: warehouses.iter().map(WarehouseRef::from).collect(),
            user_warehouse_ids: scope.sorted_ids(),
        })
    }

    /// Newest-first page of the orders whose primary warehouse the caller manages.
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        user_id: i64,
        query: PurchaseOrderQuery,
    ) -> Result<PurchaseOrderPage, ServiceError> {
        let db = &*self.db_pool;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);
        let scope = self.scope(user_id).await?;
        if scope.warehouse_ids.is_empty() {
            return Ok(PurchaseOrderPage {
                purchase_orders: Vec::new(),
                total: 0,
                limit,
                offset,
            });
        }

        let mut select = purchase_order::Entity::find()
            .filter(purchase_order::Column::IsDeleted.eq(false))
            .filter(purchase_order::Column::PrimaryWarehouseId.is_in(scope.sorted_ids()));
        if let Some(status) = query.status {
            select = select.filter(purchase_order::Column::Status.eq(status));
        }
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(purchase_order::Column::PrimaryWarehouseId.eq(warehouse_id));
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let named: Vec<i64> = warehouse::Entity::find()
                .select_only()
                .column(warehouse::Column::Id)
                .filter(warehouse::Column::Name.contains(search))
                .into_tuple()
                .all(db)
                .await
                .map_err(ServiceError::db_error)?;
            select = select.filter(
                Condition::any()
                    .add(purchase_order::Column::PoNumber.contains(search))
                    .add(purchase_order::Column::PrimaryWarehouseId.is_in(named)),
            );
        }

        let total = select
            .clone()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let orders = select
            .order_by_desc(purchase_order::Column::CreatedAt)
            .order_by_desc(purchase_order::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let order_ids: Vec<i64> = orders.iter().map(|order| order.id).collect();
        let items = purchase_order_item::Entity::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.is_in(order_ids))
            .filter(purchase_order_item::Column::IsDeleted.eq(false))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let view = LatestProgressView::from_entries(lookup::progress_rows(db, &item_ids).await?);

        let mut counts: HashMap<i64, StatusCounts> = HashMap::new();
        for item in &items {
            counts
                .entry(item.purchase_order_id)
                .or_default()
                .add(next_item_status(item.status, view.total_for_item(item.id), item.qty));
        }

        let names = lookup::warehouse_names(&lookup::active_warehouses(db).await?);
        let purchase_orders = orders
            .into_iter()
            .map(|order| {
                let counts = counts.remove(&order.id).unwrap_or_default();
                PurchaseOrderListEntry {
                    warehouse_name: names.get(&order.primary_warehouse_id).cloned(),
                    total_items: counts.total_items,
                    completed_items: counts.completed_items,
                    progress_percentage: share_percentage(counts.completed_items, counts.total_items),
                    purchase_order: order,
                }
            })
            .collect();

        Ok(PurchaseOrderPage {
            purchase_orders,
            total,
            limit,
            offset,
        })
    }

    #[instrument(skip(self))]
    pub async fn stats(&self, user_id: i64) -> Result<PurchaseOrderStats, ServiceError> {
        let scope = self.scope(user_id).await?;
        let mut stats = PurchaseOrderStats::default();
        if scope.warehouse_ids.is_empty() {
            return Ok(stats);
        }

        let orders = purchase_order::Entity::find()
            .filter(purchase_order::Column::IsDeleted.eq(false))
            .filter(purchase_order::Column::PrimaryWarehouseId.is_in(scope.sorted_ids()))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        for order in &orders {
            stats.add(order);
        }
        Ok(stats)
    }

    /// Edits header fields of a draft order.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        purchase_order_id: i64,
        user_id: i64,
        changes: PurchaseOrderChanges,
    ) -> Result<purchase_order::Model, ServiceError> {
        check_note(changes.note.as_deref())?;

        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_order_access(&scope, &order)?;
        ensure_draft(&order, "edited")?;

        if changes.is_empty() {
            return Ok(order);
        }
        if let Some(warehouse_id) = changes.primary_warehouse_id {
            lookup::find_warehouse(db, warehouse_id).await?;
        }

        let mut active = purchase_order::ActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(warehouse_id) = changes.primary_warehouse_id {
            active.primary_warehouse_id = Set(warehouse_id);
        }
        if let Some(priority) = changes.priority {
            active.priority = Set(priority);
        }
        if let Some(note) = changes.note {
            active.note = Set(Some(note));
        }
        if let Some(target_date) = changes.target_date {
            active.target_date = Set(Some(target_date));
        }

        let result = purchase_order::Entity::update_many()
            .set(active)
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::IsDeleted.eq(false))
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Draft))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            let current = lookup::find_purchase_order(db, order.id).await?;
            return Err(ensure_draft(&current, "edited").err().unwrap_or_else(|| {
                ServiceError::InternalError(format!("purchase order {} was not updated", order.id))
            }));
        }

        let updated = lookup::find_purchase_order(db, order.id).await?;
        info!(purchase_order_id, user_id, "purchase order updated");
        self.event_sender
            .send_or_log(Event::PurchaseOrderUpdated {
                purchase_order_id,
                user_id,
            })
            .await;
        Ok(updated)
    }

    /// Soft-deletes a draft order together with its items.
    #[instrument(skip(self))]
    pub async fn delete(&self, purchase_order_id: i64, user_id: i64) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_order_access(&scope, &order)?;
        ensure_draft(&order, "deleted")?;

        let now = Utc::now();
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let result = purchase_order::Entity::update_many()
            .set(purchase_order::ActiveModel {
                is_deleted: Set(true),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(purchase_order::Column::Id.eq(order.id))
            .filter(purchase_order::Column::IsDeleted.eq(false))
            .filter(purchase_order::Column::Status.eq(PurchaseOrderStatus::Draft))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            let current = lookup::find_purchase_order(db, order.id).await?;
            return Err(ensure_draft(&current, "deleted").err().unwrap_or_else(|| {
                ServiceError::InternalError(format!("purchase order {} was not deleted", order.id))
            }));
        }
        let items = purchase_order_item::Entity::update_many()
            .set(purchase_order_item::ActiveModel {
                is_deleted: Set(true),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order.id))
            .filter(purchase_order_item::Column::IsDeleted.eq(false))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(purchase_order_id, items = items.rows_affected, user_id, "purchase order deleted");
        self.event_sender
            .send_or_log(Event::PurchaseOrderDeleted {
                purchase_order_id,
                items: items.rows_affected,
                user_id,
            })
            .await;
        Ok(())
    }

    /// Items of an order with their reduced production totals.
    #[instrument(skip(self))]
    pub async fn items(
        &self,
        purchase_order_id: i64,
        user_id: i64,
    ) -> Result<Vec<ItemOverview>, ServiceError> {
        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let items = lookup::items_for_order(db, order.id).await?;
        let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let view = LatestProgressView::from_entries(lookup::progress_rows(db, &item_ids).await?);
        let names = lookup::warehouse_names(&lookup::active_warehouses(db).await?);

        Ok(items
            .into_iter()
            .map(|item| {
                let completed = view.total_for_item(item.id);
                ItemOverview {
                    warehouse_name: item.warehouse_id.and_then(|id| names.get(&id).cloned()),
                    qty_completed: completed,
                    qty_remaining: (i64::from(item.qty) - completed).max(0),
                    progress_percentage: progress_percentage(completed, item.qty),
                    item,
                }
            })
            .collect())
    }

    /// Sets an item's production status by hand.
    ///
    /// `cancelled` is always accepted. Any other status must agree with what the
    /// recorded progress implies, which also lets a cancelled item be reopened.
    #[instrument(skip(self, note))]
    pub async fn update_item_status(
        &self,
        purchase_order_id: i64,
        item_id: i64,
        user_id: i64,
        status: ItemStatus,
        note: Option<String>,
    ) -> Result<purchase_order_item::Model, ServiceError> {
        check_note(note.as_deref())?;

        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let item = lookup::find_item(db, item_id).await?;
        if item.purchase_order_id != order.id {
            return Err(ServiceError::NotFound(format!(
                "Purchase order item {} not found",
                item_id
            )));
        }
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let _guard = self.item_locks.lock(item_id).await;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let item = lookup::find_item(&txn, item_id).await?;
        let view = LatestProgressView::from_entries(lookup::progress_rows(&txn, &[item.id]).await?);
        let implied = derive_item_status(view.total_for_item(item.id), item.qty);
        if status != ItemStatus::Cancelled && status != implied {
            warn!(item_id, %status, %implied, "item status rejected");
            return Err(ServiceError::validation(format!(
                "status {} does not match recorded progress, which implies {}",
                status, implied
            )));
        }

        let now = Utc::now();
        let previous = item.status;
        let set_started = matches!(status, ItemStatus::InProgress | ItemStatus::Completed)
            && item.started_at.is_none();
        let set_completed = status == ItemStatus::Completed && item.completed_at.is_none();
        let mut active: purchase_order_item::ActiveModel = item.into();
        active.status = Set(status);
        if set_started {
            active.started_at = Set(Some(now));
        }
        if set_completed {
            active.completed_at = Set(Some(now));
        }
        if let Some(note) = note {
            active.note = Set(Some(note));
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(item_id, from = %previous, to = %status, user_id, "item status changed");
        self.event_sender
            .send_or_log(Event::ItemStatusChanged {
                item_id,
                from: previous,
                to: status,
                user_id,
            })
            .await;
        Ok(updated)
    }
}

fn ensure_draft(order: &purchase_order::Model, verb: &str) -> Result<(), ServiceError> {
    if order.status == PurchaseOrderStatus::Draft {
        Ok(())
    } else {
        Err(ServiceError::validation(format!(
            "only draft purchase orders can be {}; {} is {}",
            verb, order.po_number, order.status
        )))
    }
}

fn share_percentage(part: usize, whole: usize) -> i64 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as i64
}

/// Item counts by status derived from the latest progress, not the stored column.
async fn derived_status_counts<C: ConnectionTrait>(
    db: &C,
    purchase_order_id: i64,
) -> Result<StatusCounts, ServiceError> {
    let items = lookup::items_for_order(db, purchase_order_id).await?;
    let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    let view = LatestProgressView::from_entries(lookup::progress_rows(db, &item_ids).await?);

    let mut counts = StatusCounts::default();
    for item in &items {
        counts.add(next_item_status(item.status, view.total_for_item(item.id), item.qty));
    }
    Ok(counts)
}

/// Re-reduces the item's log and stores the derived status, optionally
/// reassigning its warehouse. Returns the new total and status.
async fn refresh_item_status<C: ConnectionTrait>(
    db: &C,
    item: purchase_order_item::Model,
    reassign_to: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(i64, ItemStatus), ServiceError> {
    let view = LatestProgressView::from_entries(lookup::progress_rows(db, &[item.id]).await?);
    let total = view.total_for_item(item.id);
    let status = next_item_status(item.status, total, item.qty);

    let started = matches!(status, ItemStatus::InProgress | ItemStatus::Completed);
    let set_started = started && item.started_at.is_none();
    let set_completed = status == ItemStatus::Completed && item.completed_at.is_none();

    let mut active: purchase_order_item::ActiveModel = item.into();
    active.status = Set(status);
    if set_started {
        active.started_at = Set(Some(now));
    }
    if set_completed {
        active.completed_at = Set(Some(now));
    }
    if let Some(warehouse_id) = reassign_to {
        active.warehouse_id = Set(Some(warehouse_id));
    }
    active.updated_at = Set(now);
    active.update(db).await.map_err(ServiceError::db_error)?;

    Ok((total, status))
}

fn item_computed(
    view: &LatestProgressView,
    item: &purchase_order_item::Model,
    warehouses: &[warehouse::Model],
    scope: &WarehouseScope,
) -> ItemComputed {
    let current = item.warehouse_id.unwrap_or(0);
    let current_warehouse_qty = view.completed_in(item.id, current);
    let other_warehouses_total = view.total_excluding(item.id, current);
    let is_transfer_destination = view.is_transfer_destination(item.id, current);
    let with_progress = view.warehouses_for_item(item.id);
    let available_transfer_targets: Vec<WarehouseRef> = warehouses
        .iter()
        .filter(|w| !with_progress.contains(&w.id))
        .map(WarehouseRef::from)
        .collect();
    let user_has_access_to_item_warehouse = item.warehouse_id.map_or(false, |id| scope.contains(id));
    let percentage = progress_percentage(view.total_for_item(item.id), item.qty);

    ItemComputed {
        current_warehouse_qty,
        other_warehouses_total,
        min_qty_for_current: current_warehouse_qty + other_warehouses_total,
        max_qty_for_current: max_qty_for_warehouse(view, item.id, item.qty, current),
        is_transfer_destination,
        can_transfer: percentage < 100
            && !available_transfer_targets.is_empty()
            && user_has_access_to_item_warehouse
            && !is_transfer_destination,
        available_transfer_targets,
        user_has_access_to_item_warehouse,
    }
}

fn shipping_progress(shipped: i64, target: i64) -> f64 {
    if target <= 0 {
        return 0.0;
    }
    ((shipped as f64 / target as f64) * 1000.0).round() / 10.0
}

fn note_suffix(note: Option<&str>) -> String {
    match note.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => format!(": {}", text),
        None => String::new(),
    }
}

fn to_quantity(qty: i64) -> Result<i32, ServiceError> {
    i32::try_from(qty)
        .map_err(|_| ServiceError::validation(format!("quantity {} is out of range", qty)))
}
