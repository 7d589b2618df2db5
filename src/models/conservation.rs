//! Quantity conservation rules for progress entries and transfers.
//!
//! For every item the latest completed quantities across its warehouses must
//! never sum above the item's target quantity.

use crate::{entities::production_progress, errors::ServiceError};

use super::progress::LatestProgressView;

pub const MAX_NOTE_LENGTH: usize = 500;

/// Largest `qty_completed` the warehouse may record right now.
///
/// A transfer destination may reclaim the slack its own current row already
/// accounts for: `qty - total + current`. Any other warehouse is bounded by
/// `qty - other_warehouses_total`. Never negative.
pub fn max_qty_for_warehouse(
    view: &LatestProgressView,
    item_id: i64,
    item_qty: i32,
    warehouse_id: i64,
) -> i64 {
    let qty = i64::from(item_qty);
    let ceiling = if view.is_transfer_destination(item_id, warehouse_id) {
        qty - view.total_for_item(item_id) + view.completed_in(item_id, warehouse_id)
    } else {
        qty - view.total_excluding(item_id, warehouse_id)
    };
    ceiling.max(0)
}

/// Validates a proposed progress entry for `(item, warehouse)`.
pub fn check_progress_entry(
    view: &LatestProgressView,
    item_id: i64,
    item_qty: i32,
    warehouse_id: i64,
    proposed: i64,
) -> Result<(), ServiceError> {
    let qty = i64::from(item_qty);
    if proposed < 0 {
        return Err(ServiceError::validation(
            "qty_completed must be a non-negative integer",
        ));
    }
    if proposed > qty {
        return Err(ServiceError::exceeds(
            format!("qty_completed cannot exceed the item target of {}", qty),
            qty,
        ));
    }

    let others = view.total_excluding(item_id, warehouse_id);
    if proposed + others > qty {
        let max_allowed = (qty - others).max(0);
        return Err(ServiceError::exceeds(
            format!(
                "qty_completed exceeds the remaining target; other warehouses already completed {}, maximum for this warehouse is {}",
                others, max_allowed
            ),
            max_allowed,
        ));
    }

    if view.is_transfer_destination(item_id, warehouse_id) {
        let ceiling = qty - view.total_for_item(item_id) + view.completed_in(item_id, warehouse_id);
        if proposed > ceiling {
            let max_allowed = ceiling.max(0);
            return Err(ServiceError::exceeds(
                format!(
                    "qty_completed exceeds the ceiling for a transfer destination warehouse, maximum is {}",
                    max_allowed
                ),
                max_allowed,
            ));
        }
    }

    Ok(())
}

/// `qty_target` recorded on a new progress row for the warehouse.
pub fn entry_target(
    view: &LatestProgressView,
    item_id: i64,
    item_qty: i32,
    warehouse_id: i64,
) -> i32 {
    match view.get(item_id, warehouse_id) {
        Some(current) if current.is_transfer_destination => current.qty_target,
        _ => item_qty,
    }
}

pub fn check_note(note: Option<&str>) -> Result<(), ServiceError> {
    match note {
        Some(text) if text.chars().count() > MAX_NOTE_LENGTH => Err(ServiceError::validation(
            format!("note must be at most {} characters", MAX_NOTE_LENGTH),
        )),
        _ => Ok(()),
    }
}

/// Validated transfer of outstanding work between two warehouses.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub item_id: i64,
    pub from_warehouse_id: i64,
    pub to_warehouse_id: i64,
    pub qty: i64,
    /// Outstanding quantity before the transfer.
    pub remaining: i64,
    /// Latest row of the source warehouse; marked released in place when present.
    pub source_entry: Option<production_progress::Model>,
    /// Latest row the destination had before the transfer. The new destination
    /// row supersedes it with `qty_completed = qty`.
    pub superseded_destination: Option<production_progress::Model>,
}

/// Checks a transfer request against the latest view and plans its writes.
pub fn plan_transfer(
    view: &LatestProgressView,
    item_id: i64,
    item_qty: i32,
    from_warehouse_id: i64,
    to_warehouse_id: i64,
    qty: i64,
) -> Result<TransferPlan, ServiceError> {
    if from_warehouse_id <= 0 || to_warehouse_id <= 0 {
        return Err(ServiceError::validation(
            "from_warehouse_id and to_warehouse_id must be positive integers",
        ));
    }
    if from_warehouse_id == to_warehouse_id {
        return Err(ServiceError::validation(
            "source and destination warehouse must differ",
        ));
    }
    if qty <= 0 {
        return Err(ServiceError::validation(
            "transfer quantity must be greater than zero",
        ));
    }

    if view.is_transfer_destination(item_id, from_warehouse_id) {
        return Err(ServiceError::validation(format!(
            "warehouse {} received this item by transfer and cannot transfer it onward",
            from_warehouse_id
        )));
    }

    let remaining = (i64::from(item_qty) - view.total_for_item(item_id)).max(0);
    if qty > remaining {
        return Err(ServiceError::exceeds(
            format!(
                "transfer quantity exceeds the outstanding quantity. Sisa: {}",
                remaining
            ),
            remaining,
        ));
    }

    Ok(TransferPlan {
        item_id,
        from_warehouse_id,
        to_warehouse_id,
        qty,
        remaining,
        source_entry: view.get(item_id, from_warehouse_id).cloned(),
        superseded_destination: view.get(item_id, to_warehouse_id).cloned(),
    })
}
