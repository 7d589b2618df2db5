mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::TestApp;
use gudang_po_api::{
    entities::{delivery_note::DeliveryNoteStatus, purchase_order::PurchaseOrderStatus},
    errors::ServiceError,
    models::ShipmentSelection,
    services::delivery_notes::NewDeliveryNote,
    storage::UploadedFile,
};

const MANAGER_A: i64 = 7;
const MANAGER_B: i64 = 8;

fn new_note(selections: Vec<ShipmentSelection>) -> NewDeliveryNote {
    NewDeliveryNote {
        delivery_date: NaiveDate::from_ymd_opt(2025, 3, 9),
        destination_address: "Jl. Raya Narogong KM 12, Bekasi".to_string(),
        note: None,
        selections,
    }
}

fn select(item_id: i64, warehouse_id: i64, qty: Option<i64>) -> ShipmentSelection {
    ShipmentSelection {
        item_id,
        warehouse_id,
        qty,
    }
}

#[tokio::test]
async fn availability_follows_issued_notes() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let order = app
        .seed_purchase_order("PO-2025-101", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let item = app.seed_item(order.id, "Pipa PVC 3 inch", 20, Some(gudang.id)).await;
    app.seed_progress(item.id, gudang.id, 19, 20, 5).await;
    // deleted notes never count as shipped
    app.seed_delivery_note(&order, "00/VOID", &[(item.id, gudang.id, 5)], true)
        .await;

    let orders = app.state.services.purchase_orders.clone();
    let notes = app.state.services.delivery_notes.clone();

    let detail = orders.get_detail(order.id, MANAGER_A).await.unwrap();
    assert_eq!(detail.items[0].available_shipments[0].qty_available, 19);
    assert!(detail.ui_state.has_available_shipments);

    let first = notes
        .create(order.id, MANAGER_A, new_note(vec![select(item.id, gudang.id, Some(1))]))
        .await
        .unwrap();
    assert_eq!(first.status, DeliveryNoteStatus::Draft);
    assert_eq!(first.summary.total_qty_shipped, 1);
    assert_eq!(first.note.as_deref(), Some("Surat Jalan dari Purchase Order"));
    assert_eq!(first.lines[0].product_name.as_deref(), Some("Pipa PVC 3 inch"));

    let detail = orders.get_detail(order.id, MANAGER_A).await.unwrap();
    assert_eq!(detail.items[0].available_shipments[0].qty_available, 18);
    assert_eq!(detail.summary.total_qty_shipped, 1);
    assert_eq!(detail.ui_state.draft_delivery_notes, 1);

    let rest = notes
        .create(order.id, MANAGER_A, new_note(vec![select(item.id, gudang.id, None)]))
        .await
        .unwrap();
    assert_eq!(rest.summary.total_qty_shipped, 18);

    let detail = orders.get_detail(order.id, MANAGER_A).await.unwrap();
    assert!(detail.items[0].available_shipments.is_empty());
    assert!(!detail.ui_state.has_available_shipments);
    assert_eq!(detail.summary.total_qty_shipped, 19);
    assert_eq!(detail.summary.total_unshipped, 0);
    assert_eq!(detail.summary.shipping_progress, 95.0);

    let err = notes
        .create(order.id, MANAGER_A, new_note(vec![select(item.id, gudang.id, Some(1))]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { .. });
}

#[tokio::test]
async fn over_selection_reports_available_quantity() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let order = app
        .seed_purchase_order("PO-2025-102", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let item = app.seed_item(order.id, "Elbow 2 inch", 30, Some(gudang.id)).await;
    app.seed_progress(item.id, gudang.id, 12, 30, 5).await;

    let err = app
        .state
        .services
        .delivery_notes
        .create(
            order.id,
            MANAGER_A,
            new_note(vec![
                select(item.id, gudang.id, Some(8)),
                select(item.id, gudang.id, Some(5)),
            ]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.max_allowed(), Some(4));
}

#[tokio::test]
async fn required_fields_are_checked() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let order = app
        .seed_purchase_order("PO-2025-103", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let notes = app.state.services.delivery_notes.clone();

    let mut missing_date = new_note(vec![select(1, gudang.id, None)]);
    missing_date.delivery_date = None;
    assert_matches!(
        notes.create(order.id, MANAGER_A, missing_date).await,
        Err(ServiceError::ValidationError { .. })
    );

    let mut blank_address = new_note(vec![select(1, gudang.id, None)]);
    blank_address.destination_address = "   ".to_string();
    assert_matches!(
        notes.create(order.id, MANAGER_A, blank_address).await,
        Err(ServiceError::ValidationError { .. })
    );

    assert_matches!(
        notes.create(order.id, MANAGER_A, new_note(Vec::new())).await,
        Err(ServiceError::ValidationError { .. })
    );
}

#[tokio::test]
async fn numbers_follow_daily_sequence() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let order = app
        .seed_purchase_order("PO-2025-104", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let item = app.seed_item(order.id, "Tee 3 inch", 10, Some(gudang.id)).await;
    app.seed_progress(item.id, gudang.id, 10, 10, 5).await;
    // a note deleted today still takes a number
    app.seed_delivery_note(&order, "01/VOID", &[], true).await;

    let notes = app.state.services.delivery_notes.clone();
    let first = notes
        .create(order.id, MANAGER_A, new_note(vec![select(item.id, gudang.id, Some(4))]))
        .await
        .unwrap();
    let second = notes
        .create(order.id, MANAGER_A, new_note(vec![select(item.id, gudang.id, Some(6))]))
        .await
        .unwrap();

    let prefix = format!("{}/", gudang.id);
    assert!(first.note_number.starts_with(&format!("02/{}", prefix)));
    assert!(second.note_number.starts_with(&format!("03/{}", prefix)));
    assert!(first.note_number.contains("/SJ-LR/"));
    assert_eq!(first.po_number, "PO-2025-104");
}

#[tokio::test]
async fn documentation_upload_marks_note_sent() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let other = app.seed_warehouse("Gudang Bekasi", Some(MANAGER_B)).await;
    let order = app
        .seed_purchase_order("PO-2025-105", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let item = app.seed_item(order.id, "Socket", 5, Some(other.id)).await;
    let note = app
        .seed_delivery_note(&order, "01/1/09/III/SJ-LR/2025", &[(item.id, other.id, 5)], false)
        .await;
    let notes = app.state.services.delivery_notes.clone();

    let photo = UploadedFile {
        filename: "bukti kirim.jpg".to_string(),
        content_type: "image/jpeg".to_string(),
        data: bytes::Bytes::from_static(b"\xff\xd8\xff\xe0jpeg"),
    };

    // item warehouse managers cannot document the primary warehouse's notes
    assert_matches!(
        notes
            .upload_documentation(note.id, MANAGER_B, vec![photo.clone()], None)
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let upload = notes
        .upload_documentation(note.id, MANAGER_A, vec![photo], Some("diterima pak Budi".into()))
        .await
        .unwrap();
    assert_eq!(upload.status, DeliveryNoteStatus::Sent);
    assert_eq!(upload.uploaded, 1);
    let entry = &upload.documentation[0];
    assert_eq!(entry.filename, "bukti kirim.jpg");
    assert_eq!(entry.uploaded_by, MANAGER_A);
    assert_eq!(entry.note.as_deref(), Some("diterima pak Budi"));
    assert!(entry.stored_filename.ends_with("bukti_kirim.jpg"));

    let stored = app
        .upload_dir
        .path()
        .join("dokumentasi/surat-jalan")
        .join(note.id.to_string())
        .join(&entry.stored_filename);
    assert!(stored.exists());

    let second = UploadedFile {
        filename: "surat.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        data: bytes::Bytes::from_static(b"%PDF-1.4"),
    };
    let upload = notes
        .upload_documentation(note.id, MANAGER_A, vec![second], None)
        .await
        .unwrap();
    assert_eq!(upload.status, DeliveryNoteStatus::Sent);
    assert_eq!(upload.documentation.len(), 2);
}

#[tokio::test]
async fn documentation_upload_rejects_bad_files() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let order = app
        .seed_purchase_order("PO-2025-106", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let note = app.seed_delivery_note(&order, "01/X", &[], false).await;
    let notes = app.state.services.delivery_notes.clone();

    assert_matches!(
        notes.upload_documentation(note.id, MANAGER_A, Vec::new(), None).await,
        Err(ServiceError::ValidationError { .. })
    );

    let text = UploadedFile {
        filename: "catatan.txt".to_string(),
        content_type: "text/plain".to_string(),
        data: bytes::Bytes::from_static(b"hello"),
    };
    assert_matches!(
        notes.upload_documentation(note.id, MANAGER_A, vec![text], None).await,
        Err(ServiceError::ValidationError { .. })
    );

    let many: Vec<UploadedFile> = (0..11)
        .map(|i| UploadedFile {
            filename: format!("foto-{}.png", i),
            content_type: "image/png".to_string(),
            data: bytes::Bytes::from_static(b"\x89PNG"),
        })
        .collect();
    assert_matches!(
        notes.upload_documentation(note.id, MANAGER_A, many, None).await,
        Err(ServiceError::ValidationError { .. })
    );

    assert_matches!(
        notes.upload_documentation(9_999, MANAGER_A, vec![], None).await,
        Err(ServiceError::ValidationError { .. })
    );
}

#[tokio::test]
async fn list_filters_by_search_and_status() {
    let app = TestApp::new().await;
    let gudang = app.seed_warehouse("Gudang Cikarang", Some(MANAGER_A)).await;
    let first = app
        .seed_purchase_order("PO-2025-107", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    let second = app
        .seed_purchase_order("PO-2025-108", gudang.id, PurchaseOrderStatus::InProduction)
        .await;
    app.seed_delivery_note(&first, "01/1/09/III/SJ-LR/2025", &[], false).await;
    app.seed_delivery_note(&second, "02/1/09/III/SJ-LR/2025", &[], false).await;
    app.seed_delivery_note(&second, "03/1/09/III/SJ-LR/2025", &[], true).await;

    let notes = app.state.services.delivery_notes.clone();
    let all = notes.list(None, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].note_number, "02/1/09/III/SJ-LR/2025");

    let found = notes.list(Some("PO-2025-107".into()), None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].purchase_order_id, first.id);

    let sent = notes
        .list(None, Some(DeliveryNoteStatus::Sent))
        .await
        .unwrap();
    assert!(sent.is_empty());

    assert_matches!(notes.get(9_999).await, Err(ServiceError::NotFound(_)));
}
