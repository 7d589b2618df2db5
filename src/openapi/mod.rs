use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

use crate::{
    entities::{
        delivery_note::DeliveryNoteStatus,
        purchase_order::{Priority, PurchaseOrderStatus},
        purchase_order_item::ItemStatus,
    },
    errors::ErrorResponse,
    handlers::{delivery_notes, purchase_orders},
    models::{shipment, PurchaseOrderAction},
    ResponseMeta,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gudang PO API",
        version = "1.0.0",
        description = r#"
# Purchase order production and delivery API

Tracks production progress of purchase order items across warehouses (gudang),
moves outstanding production between warehouses and issues delivery notes
(surat jalan) for completed quantities.

## Authentication

Every endpoint except `/health` requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Quantities

Progress rows are cumulative per `(item, warehouse)`; the newest row wins.
Rejected quantities answer `400` with `max_allowed` set to the ceiling that
would have been accepted.
"#
    ),
    paths(
        purchase_orders::list_purchase_orders,
        purchase_orders::purchase_order_stats,
        purchase_orders::get_purchase_order_detail,
        purchase_orders::update_purchase_order,
        purchase_orders::delete_purchase_order,
        purchase_orders::list_purchase_order_items,
        purchase_orders::update_item_status,
        purchase_orders::approve_purchase_order,
        purchase_orders::start_production,
        purchase_orders::complete_production,
        purchase_orders::cancel_purchase_order,
        purchase_orders::reactivate_purchase_order,
        purchase_orders::close_purchase_order,
        purchase_orders::update_item_progress,
        purchase_orders::transfer_item_progress,
        purchase_orders::create_delivery_note,
        delivery_notes::list_delivery_notes,
        delivery_notes::get_delivery_note,
        delivery_notes::upload_documentation,
    ),
    components(schemas(
        ErrorResponse,
        ResponseMeta,
        purchase_orders::UpdateProgressRequest,
        purchase_orders::TransferProgressRequest,
        purchase_orders::CreateDeliveryNoteRequest,
        purchase_orders::PurchaseOrderFilters,
        purchase_orders::UpdatePurchaseOrderRequest,
        purchase_orders::UpdateItemStatusRequest,
        delivery_notes::DeliveryNoteFilters,
        delivery_notes::DocumentationUploadForm,
        shipment::ShipmentSelection,
        shipment::DeliveryNoteLine,
        shipment::DocumentationEntry,
        PurchaseOrderAction,
        PurchaseOrderStatus,
        Priority,
        ItemStatus,
        DeliveryNoteStatus,
    )),
    tags(
        (name = "purchase-orders", description = "Purchase order lifecycle and detail"),
        (name = "production", description = "Production progress and warehouse transfers"),
        (name = "delivery-notes", description = "Delivery notes and proof-of-delivery documentation"),
    )
)]
pub struct ApiDocV1;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}
