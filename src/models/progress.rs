//! Latest-progress reduction over the append-only progress log.
//!
//! A progress log holds many rows per `(item, warehouse)` pair. Only the row
//! that sorts first under `progress_date desc, id desc` counts; everything in
//! this module works on that reduced view and never touches storage.

use std::collections::BTreeMap;

use crate::entities::{production_progress, purchase_order_item::ItemStatus};

/// `(item_id, warehouse_id)`
pub type ProgressKey = (i64, i64);

/// Most recent progress row per `(item, warehouse)`.
#[derive(Debug, Clone, Default)]
pub struct LatestProgressView {
    latest: BTreeMap<ProgressKey, production_progress::Model>,
}

/// True when `candidate` is more recent than `current`. Equal dates resolve to the higher id.
fn supersedes(candidate: &production_progress::Model, current: &production_progress::Model) -> bool {
    (candidate.progress_date, candidate.id) > (current.progress_date, current.id)
}

impl LatestProgressView {
    /// Reduces log rows into the latest-wins view. Input order does not matter.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = production_progress::Model>,
    {
        let mut latest: BTreeMap<ProgressKey, production_progress::Model> = BTreeMap::new();
        for entry in entries {
            let key = (entry.item_id, entry.warehouse_id);
            match latest.get(&key) {
                Some(current) if !supersedes(&entry, current) => {}
                _ => {
                    latest.insert(key, entry);
                }
            }
        }
        Self { latest }
    }

    pub fn get(&self, item_id: i64, warehouse_id: i64) -> Option<&production_progress::Model> {
        self.latest.get(&(item_id, warehouse_id))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.latest.len()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &production_progress::Model> {
        self.latest.values()
    }

    /// Latest rows for one item, ordered by warehouse id.
    pub fn entries_for_item(
        &self,
        item_id: i64,
    ) -> impl Iterator<Item = &production_progress::Model> {
        self.latest
            .range((item_id, i64::MIN)..=(item_id, i64::MAX))
            .map(|(_, entry)| entry)
    }

    pub fn warehouses_for_item(&self, item_id: i64) -> Vec<i64> {
        self.entries_for_item(item_id)
            .map(|entry| entry.warehouse_id)
            .collect()
    }

    /// Sum of latest completed quantity across every warehouse of the item.
    pub fn total_for_item(&self, item_id: i64) -> i64 {
        self.entries_for_item(item_id)
            .map(|entry| i64::from(entry.qty_completed))
            .sum()
    }

    /// Sum of latest completed quantity across the item's other warehouses.
    pub fn total_excluding(&self, item_id: i64, warehouse_id: i64) -> i64 {
        self.entries_for_item(item_id)
            .filter(|entry| entry.warehouse_id != warehouse_id)
            .map(|entry| i64::from(entry.qty_completed))
            .sum()
    }

    pub fn completed_in(&self, item_id: i64, warehouse_id: i64) -> i64 {
        self.get(item_id, warehouse_id)
            .map(|entry| i64::from(entry.qty_completed))
            .unwrap_or(0)
    }

    pub fn is_transfer_destination(&self, item_id: i64, warehouse_id: i64) -> bool {
        self.get(item_id, warehouse_id)
            .map(|entry| entry.is_transfer_destination)
            .unwrap_or(false)
    }
}

/// Production status implied by a completed total against its target.
pub fn derive_item_status(total_completed: i64, target: i32) -> ItemStatus {
    if total_completed >= i64::from(target) {
        ItemStatus::Completed
    } else if total_completed > 0 {
        ItemStatus::InProgress
    } else {
        ItemStatus::Pending
    }
}

/// Like [`derive_item_status`], but a cancelled item stays cancelled.
pub fn next_item_status(current: ItemStatus, total_completed: i64, target: i32) -> ItemStatus {
    match current {
        ItemStatus::Cancelled => ItemStatus::Cancelled,
        _ => derive_item_status(total_completed, target),
    }
}

/// Whole-number completion percentage; zero when the target is zero.
pub fn progress_percentage(total_completed: i64, target: i32) -> i64 {
    if target <= 0 {
        return 0;
    }
    ((total_completed as f64 / f64::from(target)) * 100.0).round() as i64
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    pub fn entry(
        id: i64,
        item_id: i64,
        warehouse_id: i64,
        qty: i32,
        date: i64,
    ) -> production_progress::Model {
        production_progress::Model {
            id,
            item_id,
            warehouse_id,
            qty_completed: qty,
            qty_target: 100,
            note: None,
            is_transfer_destination: false,
            released_to: None,
            updated_by: 1,
            progress_date: at(date),
            created_at: at(date),
            updated_at: at(date),
        }
    }
}
