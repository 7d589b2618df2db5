pub mod common;
pub mod delivery_notes;
pub mod health;
pub mod purchase_orders;

use std::sync::Arc;

use crate::{
    auth::{DbWarehouseAccess, WarehouseAccess},
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        delivery_notes::{DeliveryNoteService, DeliveryNoteSettings},
        purchase_orders::PurchaseOrderService,
    },
    storage::{DocumentStorage, LocalDocumentStorage},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub delivery_notes: Arc<DeliveryNoteService>,
}

impl AppServices {
    /// Wires the services with store-backed warehouse access and local file storage.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let access: Arc<dyn WarehouseAccess> = Arc::new(DbWarehouseAccess::new(db_pool.clone()));
        let storage: Arc<dyn DocumentStorage> =
            Arc::new(LocalDocumentStorage::new(config.upload_root()));
        Self::with_collaborators(
            db_pool,
            event_sender,
            access,
            storage,
            DeliveryNoteSettings::from(config),
        )
    }

    pub fn with_collaborators(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        access: Arc<dyn WarehouseAccess>,
        storage: Arc<dyn DocumentStorage>,
        settings: DeliveryNoteSettings,
    ) -> Self {
        let purchase_orders = Arc::new(PurchaseOrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            access.clone(),
        ));
        let delivery_notes = Arc::new(DeliveryNoteService::new(
            db_pool,
            event_sender,
            access,
            storage,
            settings,
        ));

        Self {
            purchase_orders,
            delivery_notes,
        }
    }
}

impl From<&AppConfig> for DeliveryNoteSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            series: config.delivery_note_series.clone(),
            utc_offset_hours: config.business_utc_offset_hours,
            max_documentation_files: config.max_documentation_files,
        }
    }
}
