use super::common::{
    created_response, lenient_i64, success_response, success_with_message, validate_input, ApiJson,
};
use crate::{
    auth::AuthUser,
    entities::{
        purchase_order::{self, Priority, PurchaseOrderStatus},
        purchase_order_item::ItemStatus,
    },
    errors::ServiceError,
    handlers::AppState,
    models::{PurchaseOrderAction, ShipmentSelection},
    services::{
        delivery_notes::NewDeliveryNote,
        purchase_orders::{PurchaseOrderChanges, PurchaseOrderQuery, TransferRequest},
    },
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

// Request DTOs. Field aliases accept the Indonesian names used by existing clients.

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProgressRequest {
    /// Cumulative quantity completed at the item's current warehouse
    #[serde(deserialize_with = "lenient_i64")]
    pub qty_completed: i64,
    #[serde(default, alias = "catatan")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransferProgressRequest {
    #[serde(alias = "from_gudang_id", deserialize_with = "lenient_i64")]
    pub from_warehouse_id: i64,
    #[serde(alias = "to_gudang_id", deserialize_with = "lenient_i64")]
    pub to_warehouse_id: i64,
    #[serde(alias = "qty_to_transfer", deserialize_with = "lenient_i64")]
    #[validate(range(min = 1))]
    pub qty: i64,
    #[serde(default, alias = "catatan")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateDeliveryNoteRequest {
    #[serde(default, alias = "tanggal_pengiriman")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default, alias = "alamat_tujuan")]
    #[validate(length(max = 1000))]
    pub destination_address: String,
    #[serde(default, alias = "catatan")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
    #[serde(default, alias = "selected_progress")]
    pub selections: Vec<ShipmentSelection>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct PurchaseOrderFilters {
    /// Matches PO number or primary warehouse name
    pub search: Option<String>,
    /// draft, approved, in_production, completed, cancelled or closed
    pub status: Option<String>,
    /// Primary warehouse
    #[serde(alias = "gudang")]
    pub warehouse_id: Option<i64>,
    /// Page size, 10 by default and at most 100
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePurchaseOrderRequest {
    #[serde(default, alias = "gudang_utama")]
    pub primary_warehouse_id: Option<i64>,
    #[serde(default, alias = "prioritas")]
    pub priority: Option<Priority>,
    #[serde(default, alias = "catatan")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
    #[serde(default, alias = "target_selesai")]
    pub target_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateItemStatusRequest {
    #[serde(alias = "status_produksi")]
    pub status: ItemStatus,
    #[serde(default, alias = "catatan")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl From<UpdatePurchaseOrderRequest> for PurchaseOrderChanges {
    fn from(payload: UpdatePurchaseOrderRequest) -> Self {
        Self {
            primary_warehouse_id: payload.primary_warehouse_id,
            priority: payload.priority,
            note: payload.note,
            target_date: payload.target_date,
        }
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<PurchaseOrderStatus>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => PurchaseOrderStatus::from_str(&value.to_ascii_lowercase())
            .map(Some)
            .map_err(|_| {
                ServiceError::validation(format!("unknown purchase order status '{}'", value))
            }),
    }
}

impl TryFrom<PurchaseOrderFilters> for PurchaseOrderQuery {
    type Error = ServiceError;

    fn try_from(filters: PurchaseOrderFilters) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse_status(filters.status.as_deref())?,
            search: filters.search,
            warehouse_id: filters.warehouse_id,
            limit: filters.limit,
            offset: filters.offset,
        })
    }
}

impl From<TransferProgressRequest> for TransferRequest {
    fn from(payload: TransferProgressRequest) -> Self {
        Self {
            from_warehouse_id: payload.from_warehouse_id,
            to_warehouse_id: payload.to_warehouse_id,
            qty: payload.qty,
            note: payload.note,
        }
    }
}

impl From<CreateDeliveryNoteRequest> for NewDeliveryNote {
    fn from(payload: CreateDeliveryNoteRequest) -> Self {
        Self {
            delivery_date: payload.delivery_date,
            destination_address: payload.destination_address,
            note: payload.note,
            selections: payload.selections,
        }
    }
}

fn transition_body(order: &purchase_order::Model) -> serde_json::Value {
    serde_json::json!({
        "id": order.id,
        "po_number": order.po_number,
        "status": order.status,
        "approved_by": order.approved_by,
        "approved_at": order.approved_at,
        "cancelled_by": order.cancelled_by,
        "cancelled_at": order.cancelled_at,
        "updated_at": order.updated_at,
    })
}

async fn run_transition(
    state: &AppState,
    id: i64,
    user: &AuthUser,
    action: PurchaseOrderAction,
) -> Result<axum::response::Response, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .transition(id, user.user_id, action)
        .await?;

    info!(
        purchase_order_id = order.id,
        status = %order.status,
        user_id = user.user_id,
        "Purchase order {}", action
    );

    Ok(success_with_message(
        transition_body(&order),
        format!("Purchase order {} is now {}", order.po_number, order.status),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/purchase-orders",
    params(
        PurchaseOrderFilters
    ),
    responses(
        (status = 200, description = "Page of purchase orders of the caller's warehouses", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filters): Query<PurchaseOrderFilters>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state
        .services
        .purchase_orders
        .list(user.user_id, filters.try_into()?)
        .await?;
    Ok(success_response(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/purchase-orders/stats",
    responses(
        (status = 200, description = "Order counts per status plus urgent orders", body = crate::ApiResponse<serde_json::Value>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn purchase_order_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.purchase_orders.stats(user.user_id).await?;
    Ok(success_response(stats))
}

#[utoipa::path(
    put,
    path = "/api/v1/warehouse/purchase-orders/{id}",
    request_body = UpdatePurchaseOrderRequest,
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not a draft", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a manager of the primary warehouse", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order or warehouse not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn update_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let order = state
        .services
        .purchase_orders
        .update(id, user.user_id, payload.into())
        .await?;
    Ok(success_with_message(order, "Purchase order updated"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/warehouse/purchase-orders/{id}",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order deleted", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not a draft", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a manager of the primary warehouse", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn delete_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .purchase_orders
        .delete(id, user.user_id)
        .await?;

    info!(purchase_order_id = id, user_id = user.user_id, "Purchase order deleted");
    Ok(success_with_message(
        serde_json::json!({ "id": id }),
        "Purchase order deleted",
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/purchase-orders/{id}/items",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Items with production totals", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "No access to the order's warehouses", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn list_purchase_order_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .purchase_orders
        .items(id, user.user_id)
        .await?;
    Ok(success_response(items))
}

#[utoipa::path(
    put,
    path = "/api/v1/warehouse/purchase-orders/{id}/items/{item_id}/status",
    request_body = UpdateItemStatusRequest,
    params(
        ("id" = i64, Path, description = "Purchase order ID"),
        ("item_id" = i64, Path, description = "Purchase order item ID")
    ),
    responses(
        (status = 200, description = "Item status updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Status contradicts recorded progress", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn update_item_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(i64, i64)>,
    ApiJson(payload): ApiJson<UpdateItemStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let item = state
        .services
        .purchase_orders
        .update_item_status(id, item_id, user.user_id, payload.status, payload.note)
        .await?;
    Ok(success_with_message(item, "Item status updated"))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouse/purchase-orders/{id}",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order production detail", body = crate::ApiResponse<serde_json::Value>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse),
        (status = 403, description = "No access to the order's warehouses", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .purchase_orders
        .get_detail(id, user.user_id)
        .await?;
    Ok(success_response(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/approve",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order approved", body = crate::ApiResponse<serde_json::Value>),
        (status = 403, description = "Not a manager of the primary warehouse", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 400, description = "Order is not in draft", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn approve_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::Approve).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/start-production",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Production started", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not approved", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn start_production(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::StartProduction).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/complete",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Production completed", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order not in production or items still open", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn complete_production(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::CompleteProduction).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/cancel",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order cancelled", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order cannot be cancelled from its status", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::Cancel).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/reactivate",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order back in draft", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not cancelled", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn reactivate_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::Reactivate).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/close",
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order closed", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Order is not completed", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn close_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    run_transition(&state, id, &user, PurchaseOrderAction::Close).await
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/items/{item_id}/progress",
    request_body = UpdateProgressRequest,
    params(
        ("item_id" = i64, Path, description = "Purchase order item ID")
    ),
    responses(
        (status = 200, description = "Progress recorded", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Quantity outside the allowed range", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn update_item_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateProgressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let update = state
        .services
        .purchase_orders
        .update_item_progress(item_id, user.user_id, payload.qty_completed, payload.note)
        .await?;

    info!(
        item_id,
        warehouse_id = update.warehouse_id,
        total_completed = update.total_completed,
        "Production progress recorded"
    );

    Ok(success_with_message(update, "Production progress recorded"))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/items/{item_id}/transfer",
    request_body = TransferProgressRequest,
    params(
        ("item_id" = i64, Path, description = "Purchase order item ID")
    ),
    responses(
        (status = 200, description = "Outstanding production transferred", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid transfer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item or warehouse not found", body = crate::errors::ErrorResponse)
    ),
    tag = "production"
)]
pub async fn transfer_item_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<i64>,
    ApiJson(payload): ApiJson<TransferProgressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let outcome = state
        .services
        .purchase_orders
        .transfer_progress(item_id, user.user_id, payload.into())
        .await?;

    let message = format!(
        "Transferred {} qty from {} to {}",
        outcome.qty_transferred, outcome.from_warehouse, outcome.to_warehouse
    );
    Ok(success_with_message(outcome, message))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouse/purchase-orders/{id}/delivery-notes",
    request_body = CreateDeliveryNoteRequest,
    params(
        ("id" = i64, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 201, description = "Delivery note issued", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid selection or quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "delivery-notes"
)]
pub async fn create_delivery_note(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<CreateDeliveryNoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let note = state
        .services
        .delivery_notes
        .create(id, user.user_id, payload.into())
        .await?;

    info!(
        delivery_note_id = note.id,
        note_number = %note.note_number,
        "Delivery note issued"
    );

    let message = format!("Delivery note {} created", note.note_number);
    Ok(created_response(note, message))
}

/// Creates the router for purchase order production endpoints
pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders))
        .route("/stats", get(purchase_order_stats))
        .route(
            "/:id",
            get(get_purchase_order_detail)
                .put(update_purchase_order)
                .delete(delete_purchase_order),
        )
        .route("/:id/items", get(list_purchase_order_items))
        .route("/:id/items/:item_id/status", put(update_item_status))
        .route("/:id/approve", post(approve_purchase_order))
        .route("/:id/start-production", post(start_production))
        .route("/:id/complete", post(complete_production))
        .route("/:id/cancel", post(cancel_purchase_order))
        .route("/:id/reactivate", post(reactivate_purchase_order))
        .route("/:id/close", post(close_purchase_order))
        .route("/:id/delivery-notes", post(create_delivery_note))
        .route("/items/:item_id/progress", post(update_item_progress))
        .route("/items/:item_id/transfer", post(transfer_item_progress))
}
