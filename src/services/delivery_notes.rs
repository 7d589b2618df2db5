use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{WarehouseAccess, WarehouseScope},
    db::DbPool,
    entities::delivery_note::{self, DeliveryNoteStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        conservation::check_note,
        numbering::{business_day, delivery_note_number},
        progress::LatestProgressView,
        shipment::{
            available_shipments, parse_documentation, parse_lines, resolve_selections,
            shipped_quantities, DeliveryNoteLine, DocumentationEntry, ShipmentSelection,
        },
    },
    storage::{DocumentStorage, UploadedFile, ALLOWED_CONTENT_TYPES},
};

use super::{locks::KeyedLocks, lookup};

pub const LIST_LIMIT: u64 = 100;
const DEFAULT_NOTE: &str = "Surat Jalan dari Purchase Order";

/// Numbering and upload settings taken from the application config.
#[derive(Debug, Clone)]
pub struct DeliveryNoteSettings {
    pub series: String,
    pub utc_offset_hours: i32,
    pub max_documentation_files: usize,
}

impl Default for DeliveryNoteSettings {
    fn default() -> Self {
        Self {
            series: "SJ-LR".to_string(),
            utc_offset_hours: 7,
            max_documentation_files: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDeliveryNote {
    pub delivery_date: Option<NaiveDate>,
    pub destination_address: String,
    pub note: Option<String>,
    pub selections: Vec<ShipmentSelection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryNoteSummary {
    pub total_lines: usize,
    pub total_qty_shipped: i64,
}

/// Delivery note with its JSON columns parsed.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryNoteView {
    pub id: i64,
    pub note_number: String,
    pub purchase_order_id: i64,
    pub po_number: String,
    pub destination_address: String,
    pub note: Option<String>,
    pub author_id: i64,
    pub delivery_date: NaiveDate,
    pub status: DeliveryNoteStatus,
    pub lines: Vec<DeliveryNoteLine>,
    pub documentation: Vec<DocumentationEntry>,
    pub summary: DeliveryNoteSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<delivery_note::Model> for DeliveryNoteView {
    fn from(model: delivery_note::Model) -> Self {
        let lines = parse_lines(&model.lines);
        let documentation = parse_documentation(&model.documentation);
        let summary = DeliveryNoteSummary {
            total_lines: lines.len(),
            total_qty_shipped: lines.iter().map(|line| line.qty_shipped).sum(),
        };
        Self {
            id: model.id,
            note_number: model.note_number,
            purchase_order_id: model.purchase_order_id,
            po_number: model.po_number,
            destination_address: model.destination_address,
            note: model.note,
            author_id: model.author_id,
            delivery_date: model.delivery_date,
            status: model.status,
            lines,
            documentation,
            summary,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentationUpload {
    pub id: i64,
    pub status: DeliveryNoteStatus,
    pub uploaded: usize,
    pub documentation: Vec<DocumentationEntry>,
}

/// Delivery notes (surat jalan) and their proof-of-delivery files.
#[derive(Clone)]
pub struct DeliveryNoteService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    access: Arc<dyn WarehouseAccess>,
    storage: Arc<dyn DocumentStorage>,
    settings: DeliveryNoteSettings,
    order_locks: Arc<KeyedLocks<i64>>,
    note_locks: Arc<KeyedLocks<i64>>,
    numbering: Arc<Mutex<()>>,
}

impl DeliveryNoteService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        access: Arc<dyn WarehouseAccess>,
        storage: Arc<dyn DocumentStorage>,
        settings: DeliveryNoteSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            access,
            storage,
            settings,
            order_locks: Arc::new(KeyedLocks::new()),
            note_locks: Arc::new(KeyedLocks::new()),
            numbering: Arc::new(Mutex::new(())),
        }
    }

    async fn scope(&self, user_id: i64) -> Result<WarehouseScope, ServiceError> {
        WarehouseScope::resolve(self.access.as_ref(), user_id).await
    }

    /// Issues a delivery note for the selected shippable quantities.
    #[instrument(skip(self, input), fields(selections = input.selections.len()))]
    pub async fn create(
        &self,
        purchase_order_id: i64,
        user_id: i64,
        input: NewDeliveryNote,
    ) -> Result<DeliveryNoteView, ServiceError> {
        let delivery_date = input
            .delivery_date
            .ok_or_else(|| ServiceError::validation("delivery_date is required"))?;
        let destination_address = input.destination_address.trim().to_string();
        if destination_address.is_empty() {
            return Err(ServiceError::validation("destination_address is required"));
        }
        if input.selections.is_empty() {
            return Err(ServiceError::validation("select at least one item to ship"));
        }
        check_note(input.note.as_deref())?;

        let db = &*self.db_pool;
        let order = lookup::find_purchase_order(db, purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_transfer_access(db, &scope, &order).await?;

        let _order_guard = self.order_locks.lock(order.id).await;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let items = lookup::items_for_order(&txn, order.id).await?;
        let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
        let view = LatestProgressView::from_entries(lookup::progress_rows(&txn, &item_ids).await?);
        let notes = lookup::delivery_notes_for_order(&txn, order.id).await?;
        let shipped = shipped_quantities(&notes);
        let warehouses = lookup::active_warehouses(&txn).await?;
        let names = lookup::warehouse_names(&warehouses);
        let available = available_shipments(&view, &items, &shipped, &names);

        let lines = match resolve_selections(&available, &input.selections) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(purchase_order_id, error = %err, "delivery note selection rejected");
                return Err(err);
            }
        };
        let lines_json = serde_json::to_string(&lines)
            .map_err(|e| ServiceError::InternalError(format!("failed to encode lines: {}", e)))?;

        let _numbering_guard = self.numbering.lock().await;
        let now = Utc::now();
        let day = business_day(now, self.settings.utc_offset_hours)?;
        let issued_today = delivery_note::Entity::find()
            .filter(delivery_note::Column::CreatedAt.gte(day.starts_at))
            .filter(delivery_note::Column::CreatedAt.lt(day.ends_at))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let note_number = delivery_note_number(
            issued_today + 1,
            order.primary_warehouse_id,
            day.date,
            &self.settings.series,
        );

        let created = delivery_note::ActiveModel {
            note_number: Set(note_number.clone()),
            purchase_order_id: Set(order.id),
            po_number: Set(order.po_number.clone()),
            destination_address: Set(destination_address),
            note: Set(Some(
                input
                    .note
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_NOTE.to_string()),
            )),
            lines: Set(lines_json),
            documentation: Set("[]".to_string()),
            author_id: Set(user_id),
            delivery_date: Set(delivery_date),
            status: Set(DeliveryNoteStatus::Draft),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(purchase_order_id, %note_number, "failed to insert delivery note: {}", e);
            ServiceError::db_error(e)
        })?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        let view = DeliveryNoteView::from(created);
        info!(
            purchase_order_id,
            delivery_note_id = view.id,
            note_number = %view.note_number,
            total_qty_shipped = view.summary.total_qty_shipped,
            "delivery note created"
        );
        self.event_sender
            .send_or_log(Event::DeliveryNoteCreated {
                delivery_note_id: view.id,
                purchase_order_id,
                note_number: view.note_number.clone(),
                total_qty_shipped: view.summary.total_qty_shipped,
            })
            .await;

        Ok(view)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<DeliveryNoteView, ServiceError> {
        let note = lookup::find_delivery_note(&*self.db_pool, id).await?;
        Ok(DeliveryNoteView::from(note))
    }

    /// Newest non-deleted notes, optionally filtered by number search and status.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        search: Option<String>,
        status: Option<DeliveryNoteStatus>,
    ) -> Result<Vec<DeliveryNoteView>, ServiceError> {
        let mut query = delivery_note::Entity::find()
            .filter(delivery_note::Column::IsDeleted.eq(false));

        if let Some(term) = search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(delivery_note::Column::NoteNumber.contains(term))
                    .add(delivery_note::Column::PoNumber.contains(term)),
            );
        }
        if let Some(status) = status {
            query = query.filter(delivery_note::Column::Status.eq(status));
        }

        let notes = query
            .order_by_desc(delivery_note::Column::CreatedAt)
            .order_by_desc(delivery_note::Column::Id)
            .limit(LIST_LIMIT)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(notes.into_iter().map(DeliveryNoteView::from).collect())
    }

    /// Stores proof-of-delivery files and appends them to the note.
    /// A draft note becomes sent; other statuses are kept.
    #[instrument(skip(self, files, note), fields(files = files.len()))]
    pub async fn upload_documentation(
        &self,
        delivery_note_id: i64,
        user_id: i64,
        files: Vec<UploadedFile>,
        note: Option<String>,
    ) -> Result<DocumentationUpload, ServiceError> {
        if files.is_empty() {
            return Err(ServiceError::validation("upload at least one documentation file"));
        }
        if files.len() > self.settings.max_documentation_files {
            return Err(ServiceError::validation(format!(
                "at most {} documentation files per upload",
                self.settings.max_documentation_files
            )));
        }
        if let Some(file) = files.iter().find(|file| !file.has_allowed_type()) {
            return Err(ServiceError::validation(format!(
                "file {} has unsupported type {}; allowed: {}",
                file.filename,
                file.content_type,
                ALLOWED_CONTENT_TYPES.join(", ")
            )));
        }
        check_note(note.as_deref())?;

        let db = &*self.db_pool;
        let existing = lookup::find_delivery_note(db, delivery_note_id).await?;
        let order = lookup::find_purchase_order(db, existing.purchase_order_id).await?;
        let scope = self.scope(user_id).await?;
        lookup::ensure_order_access(&scope, &order)?;

        let _guard = self.note_locks.lock(delivery_note_id).await;
        let uploaded_at = Utc::now();
        let note = note.filter(|text| !text.trim().is_empty());

        let mut entries = Vec::with_capacity(files.len());
        for file in &files {
            let stored = self
                .storage
                .store_delivery_document(delivery_note_id, file)
                .await
                .map_err(|e| {
                    error!(delivery_note_id, filename = %file.filename, "failed to store document: {}", e);
                    e
                })?;
            entries.push(DocumentationEntry {
                filename: file.filename.clone(),
                stored_filename: stored.stored_filename,
                path: stored.path,
                content_type: file.content_type.clone(),
                size: file.size(),
                uploaded_at,
                uploaded_by: user_id,
                note: note.clone(),
            });
        }

        let txn = db.begin().await.map_err(ServiceError::db_error)?;
        let current = lookup::find_delivery_note(&txn, delivery_note_id).await?;
        let mut documentation = parse_documentation(&current.documentation);
        documentation.extend(entries);
        let status = match current.status {
            DeliveryNoteStatus::Draft => DeliveryNoteStatus::Sent,
            other => other,
        };
        let documentation_json = serde_json::to_string(&documentation).map_err(|e| {
            ServiceError::InternalError(format!("failed to encode documentation: {}", e))
        })?;

        let mut active: delivery_note::ActiveModel = current.into();
        active.documentation = Set(documentation_json);
        active.status = Set(status);
        active.updated_at = Set(uploaded_at);
        active.update(&txn).await.map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(delivery_note_id, files = files.len(), status = %status, "documentation uploaded");
        self.event_sender
            .send_or_log(Event::DocumentationUploaded {
                delivery_note_id,
                files: files.len(),
                user_id,
                at: uploaded_at,
            })
            .await;

        Ok(DocumentationUpload {
            id: delivery_note_id,
            status,
            uploaded: files.len(),
            documentation,
        })
    }
}
