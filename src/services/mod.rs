// Production bookkeeping and purchase order lifecycle
pub mod purchase_orders;

// Delivery notes (surat jalan) and documentation
pub mod delivery_notes;

// Shared store reads and in-process locking
pub mod locks;
pub mod lookup;
