pub mod delivery_note;
pub mod production_progress;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod warehouse;
