pub mod conservation;
pub mod lifecycle;
pub mod numbering;
pub mod progress;
pub mod shipment;

pub use conservation::{check_progress_entry, max_qty_for_warehouse, plan_transfer, TransferPlan};
pub use lifecycle::{available_actions, PurchaseOrderAction};
pub use progress::{derive_item_status, next_item_status, progress_percentage, LatestProgressView};
pub use shipment::{AvailableShipment, DeliveryNoteLine, DocumentationEntry, ShipmentSelection};
