mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::TestApp;
use gudang_po_api::{
    entities::{purchase_order::PurchaseOrderStatus, purchase_order_item::ItemStatus},
    errors::ServiceError,
    services::purchase_orders::TransferRequest,
};
use sea_orm::ConnectionTrait;

const MANAGER_A: i64 = 7;
const MANAGER_B: i64 = 8;
const OUTSIDER: i64 = 99;

struct Fixture {
    app: TestApp,
    gudang_a: i64,
    gudang_b: i64,
}

async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    let a = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let b = app.seed_warehouse("Gudang Bekasi", Some(MANAGER_B)).await;
    Fixture {
        app,
        gudang_a: a.id,
        gudang_b: b.id,
    }
}

fn transfer(from: i64, to: i64, qty: i64) -> TransferRequest {
    TransferRequest {
        from_warehouse_id: from,
        to_warehouse_id: to,
        qty,
        note: None,
    }
}

#[tokio::test]
async fn progress_is_capped_by_other_warehouses() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-001", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 3 inch", 100, Some(f.gudang_b)).await;
    f.app.seed_progress(item.id, f.gudang_a, 40, 100, 10).await;

    let service = f.app.state.services.purchase_orders.clone();
    let err = service
        .update_item_progress(item.id, MANAGER_B, 70, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { .. });
    assert_eq!(err.max_allowed(), Some(60));

    let update = service
        .update_item_progress(item.id, MANAGER_B, 60, Some("shift malam".into()))
        .await
        .unwrap();
    assert_eq!(update.warehouse_id, f.gudang_b);
    assert_eq!(update.total_completed, 100);
    assert_eq!(update.percentage, 100);
    assert_eq!(update.status, ItemStatus::Completed);

    let stored = f.app.reload_item(item.id).await;
    assert_eq!(stored.status, ItemStatus::Completed);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn negative_quantity_is_rejected() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-002", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 2 inch", 10, Some(f.gudang_a)).await;

    let err = f
        .app
        .state
        .services
        .purchase_orders
        .update_item_progress(item.id, MANAGER_A, -1, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { max_allowed: None, .. });
}

#[tokio::test]
async fn newest_entry_per_warehouse_wins() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-003", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Elbow 3 inch", 50, Some(f.gudang_a)).await;
    f.app.seed_progress(item.id, f.gudang_a, 10, 50, 30).await;
    f.app.seed_progress(item.id, f.gudang_a, 25, 50, 5).await;
    f.app.seed_progress(item.id, f.gudang_b, 5, 50, 20).await;

    let detail = f
        .app
        .state
        .services
        .purchase_orders
        .get_detail(order.id, MANAGER_A)
        .await
        .unwrap();

    let item_detail = &detail.items[0];
    assert_eq!(item_detail.qty_completed, 30);
    assert_eq!(item_detail.qty_remaining, 20);
    assert_eq!(item_detail.status, ItemStatus::InProgress);
    assert_eq!(item_detail.progress_per_warehouse.len(), 2);
    assert_eq!(item_detail.history.len(), 3);
    assert_eq!(item_detail.computed.max_qty_for_current, 45);
    assert_eq!(detail.stats.in_progress_items, 1);
    assert_eq!(detail.user_warehouse_ids, vec![f.gudang_a]);
}

#[tokio::test]
async fn transfer_moves_outstanding_quantity() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-004", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 4 inch", 100, Some(f.gudang_a)).await;
    f.app.seed_progress(item.id, f.gudang_a, 40, 100, 10).await;

    let service = f.app.state.services.purchase_orders.clone();
    let outcome = service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 30))
        .await
        .unwrap();
    assert_eq!(outcome.qty_transferred, 30);
    assert_eq!(outcome.from_warehouse, "Gudang Cikarang");
    assert_eq!(outcome.to_warehouse, "Gudang Bekasi");
    assert_eq!(outcome.total_completed, 70);
    assert_eq!(outcome.status, ItemStatus::InProgress);

    let stored = f.app.reload_item(item.id).await;
    assert_eq!(stored.warehouse_id, Some(f.gudang_b));

    let detail = service.get_detail(order.id, MANAGER_A).await.unwrap();
    let rows = &detail.items[0].progress_per_warehouse;
    let source = rows.iter().find(|r| r.warehouse_id == f.gudang_a).unwrap();
    assert_eq!(source.qty_completed, 40);
    assert_eq!(source.released_to, Some(f.gudang_b));
    assert!(source
        .note
        .as_deref()
        .unwrap()
        .starts_with("Released remaining production to Gudang Bekasi"));
    let destination = rows.iter().find(|r| r.warehouse_id == f.gudang_b).unwrap();
    assert!(destination.is_transfer_destination);
    assert_eq!(destination.qty_completed, 30);
    assert_eq!(
        destination.note.as_deref(),
        Some("Transfer dari Gudang Cikarang (30 qty)")
    );
}

#[tokio::test]
async fn transfer_destination_cannot_forward_and_is_capped() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-005", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Tee 3 inch", 100, Some(f.gudang_a)).await;
    f.app.seed_progress(item.id, f.gudang_a, 40, 100, 10).await;

    let service = f.app.state.services.purchase_orders.clone();
    service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 30))
        .await
        .unwrap();

    let onward = service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_b, f.gudang_a, 5))
        .await
        .unwrap_err();
    assert_matches!(onward, ServiceError::ValidationError { .. });

    let too_much = service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 31))
        .await
        .unwrap_err();
    assert_eq!(too_much.max_allowed(), Some(30));

    // item now produced at the destination
    let err = service
        .update_item_progress(item.id, MANAGER_B, 61, None)
        .await
        .unwrap_err();
    assert_eq!(err.max_allowed(), Some(60));

    let update = service
        .update_item_progress(item.id, MANAGER_B, 60, None)
        .await
        .unwrap();
    assert_eq!(update.total_completed, 100);
    assert_eq!(update.status, ItemStatus::Completed);
}

#[tokio::test]
async fn transfer_without_source_entry_records_release() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-006", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Socket 2 inch", 12, Some(f.gudang_a)).await;

    let service = f.app.state.services.purchase_orders.clone();
    let outcome = service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 12))
        .await
        .unwrap();
    assert_eq!(outcome.total_completed, 12);
    assert_eq!(outcome.status, ItemStatus::Completed);

    let detail = service.get_detail(order.id, MANAGER_A).await.unwrap();
    let source = detail.items[0]
        .progress_per_warehouse
        .iter()
        .find(|r| r.warehouse_id == f.gudang_a)
        .unwrap();
    assert_eq!(source.qty_completed, 0);
    assert_eq!(source.qty_target, 12);
    assert_eq!(source.note.as_deref(), Some("Released to Gudang Bekasi"));
}

#[tokio::test]
async fn transfer_to_unknown_warehouse_is_not_found() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-007", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Reducer", 10, Some(f.gudang_a)).await;

    let err = f
        .app
        .state
        .services
        .purchase_orders
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, 4_242, 5))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn users_without_warehouses_are_forbidden() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-008", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Klem", 10, Some(f.gudang_a)).await;
    let service = f.app.state.services.purchase_orders.clone();

    assert_matches!(
        service.update_item_progress(item.id, OUTSIDER, 1, None).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        service.get_detail(order.id, OUTSIDER).await,
        Err(ServiceError::Forbidden(_))
    );
    // item warehouse managers may record progress but not move the order
    assert_matches!(
        service.cancel(order.id, MANAGER_B).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn completion_requires_every_item_finished() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-009", f.gudang_a, PurchaseOrderStatus::Draft)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 1 inch", 20, Some(f.gudang_a)).await;
    let service = f.app.state.services.purchase_orders.clone();

    let approved = service.approve(order.id, MANAGER_A).await.unwrap();
    assert_eq!(approved.status, PurchaseOrderStatus::Approved);
    assert_eq!(approved.approved_by, Some(MANAGER_A));
    assert!(approved.approved_at.is_some());

    service.start_production(order.id, MANAGER_A).await.unwrap();

    let err = service
        .complete_production(order.id, MANAGER_A)
        .await
        .unwrap_err();
    assert_matches!(&err, ServiceError::InvalidTransition(msg) if msg.contains("1 item(s) pending"));
    assert_eq!(
        f.app.reload_order(order.id).await.status,
        PurchaseOrderStatus::InProduction
    );

    service
        .update_item_progress(item.id, MANAGER_A, 20, None)
        .await
        .unwrap();
    let completed = service.complete_production(order.id, MANAGER_A).await.unwrap();
    assert_eq!(completed.status, PurchaseOrderStatus::Completed);

    let closed = service.close(order.id, MANAGER_A).await.unwrap();
    assert_eq!(closed.status, PurchaseOrderStatus::Closed);

    assert_matches!(
        service.cancel(order.id, MANAGER_A).await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn cancel_and_reactivate_round_trip() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-010", f.gudang_a, PurchaseOrderStatus::Approved)
        .await;
    let service = f.app.state.services.purchase_orders.clone();

    let cancelled = service.cancel(order.id, MANAGER_A).await.unwrap();
    assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(MANAGER_A));

    assert_matches!(
        service.start_production(order.id, MANAGER_A).await,
        Err(ServiceError::InvalidTransition(_))
    );

    let reactivated = service.reactivate(order.id, MANAGER_A).await.unwrap();
    assert_eq!(reactivated.status, PurchaseOrderStatus::Draft);
    assert_eq!(reactivated.cancelled_by, None);
    assert_eq!(reactivated.cancelled_at, None);
}

#[tokio::test]
async fn concurrent_transfers_never_exceed_outstanding() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-011", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Flange", 50, Some(f.gudang_a)).await;
    f.app.seed_progress(item.id, f.gudang_a, 20, 50, 10).await;
    let c = f.app.seed_warehouse("Gudang Karawang", Some(MANAGER_A)).await;

    let service = f.app.state.services.purchase_orders.clone();
    let (first, second) = tokio::join!(
        service.transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 30)),
        service.transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, c.id, 30)),
    );
    let succeeded = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(succeeded, 1);

    let detail = service.get_detail(order.id, MANAGER_A).await.unwrap();
    assert_eq!(detail.items[0].qty_completed, 50);
}

#[tokio::test]
async fn transfer_into_warehouse_with_progress_writes_transferred_quantity() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-012", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 6 inch", 100, Some(f.gudang_a)).await;
    f.app.seed_progress(item.id, f.gudang_a, 40, 100, 20).await;
    f.app.seed_progress(item.id, f.gudang_b, 10, 100, 10).await;

    let service = f.app.state.services.purchase_orders.clone();
    let outcome = service
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 20))
        .await
        .unwrap();
    // the earlier 10 at the destination is superseded, not added to
    assert_eq!(outcome.total_completed, 60);

    let detail = service.get_detail(order.id, MANAGER_A).await.unwrap();
    let destination = detail.items[0]
        .progress_per_warehouse
        .iter()
        .find(|r| r.warehouse_id == f.gudang_b)
        .unwrap();
    assert!(destination.is_transfer_destination);
    assert_eq!(destination.qty_completed, 20);
    assert_eq!(destination.qty_target, 20);
    assert_eq!(detail.items[0].qty_completed, 60);
}

#[tokio::test]
async fn failed_destination_insert_rolls_back_the_transfer() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-013", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Pipa PVC 5 inch", 100, Some(f.gudang_a)).await;
    let source = f.app.seed_progress(item.id, f.gudang_a, 40, 100, 10).await;

    f.app
        .db()
        .execute_unprepared(
            "CREATE TRIGGER fail_transfer_destination \
             BEFORE INSERT ON production_progress \
             WHEN NEW.is_transfer_destination = 1 \
             BEGIN SELECT RAISE(ABORT, 'destination insert failed'); END;",
        )
        .await
        .unwrap();

    let err = f
        .app
        .state
        .services
        .purchase_orders
        .transfer_progress(item.id, MANAGER_A, transfer(f.gudang_a, f.gudang_b, 30))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DatabaseError(_));

    let stored = f.app.reload_item(item.id).await;
    assert_eq!(stored.warehouse_id, Some(f.gudang_a));
    assert_eq!(stored.status, ItemStatus::Pending);

    let rows = f.app.progress_for_item(item.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, source.id);
    assert_eq!(rows[0].note, None);
    assert_eq!(rows[0].released_to, None);
    assert_eq!(rows[0].qty_completed, 40);
}

#[tokio::test]
async fn item_milestones_are_stamped_once() {
    let f = fixture().await;
    let order = f
        .app
        .seed_purchase_order("PO-2025-014", f.gudang_a, PurchaseOrderStatus::InProduction)
        .await;
    let item = f.app.seed_item(order.id, "Knee 2 inch", 10, Some(f.gudang_a)).await;
    let service = f.app.state.services.purchase_orders.clone();

    service.update_item_progress(item.id, MANAGER_A, 3, None).await.unwrap();
    let started_at = f.app.reload_item(item.id).await.started_at;
    assert!(started_at.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    service.update_item_progress(item.id, MANAGER_A, 5, None).await.unwrap();
    assert_eq!(f.app.reload_item(item.id).await.started_at, started_at);

    service.update_item_progress(item.id, MANAGER_A, 10, None).await.unwrap();
    let completed = f.app.reload_item(item.id).await;
    assert_eq!(completed.status, ItemStatus::Completed);
    let completed_at = completed.completed_at;
    assert!(completed_at.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let update = service
        .update_item_progress(item.id, MANAGER_A, 8, Some("koreksi hitung".into()))
        .await
        .unwrap();
    assert_eq!(update.status, ItemStatus::InProgress);

    let reopened = f.app.reload_item(item.id).await;
    assert_eq!(reopened.status, ItemStatus::InProgress);
    assert_eq!(reopened.started_at, started_at);
    assert_eq!(reopened.completed_at, completed_at);
}
