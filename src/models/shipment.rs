//! Shipment availability against issued delivery notes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::{delivery_note, purchase_order_item},
    errors::ServiceError,
};

use super::progress::{LatestProgressView, ProgressKey};

/// One shipped line stored in a delivery note.
///
/// Older notes were written with `gudang_id`/`qty_kirim` style keys, which are
/// still accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryNoteLine {
    pub item_id: i64,
    #[serde(alias = "gudang_id")]
    pub warehouse_id: i64,
    #[serde(alias = "qty_kirim")]
    pub qty_shipped: i64,
    #[serde(default, alias = "nama_produk")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub qty_target: Option<i64>,
    #[serde(default, alias = "qty_selesai")]
    pub qty_completed: Option<i64>,
    #[serde(default, alias = "gudang")]
    pub warehouse_name: Option<String>,
}

/// Proof-of-delivery file attached to a delivery note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentationEntry {
    pub filename: String,
    pub stored_filename: String,
    pub path: String,
    #[serde(alias = "mimetype")]
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: i64,
    #[serde(default, alias = "catatan")]
    pub note: Option<String>,
}

/// Parses a stored JSON array, skipping elements that do not fit `T`.
/// A malformed document reads as an empty list.
fn parse_json_list<T: for<'de> Deserialize<'de>>(raw: &str) -> Vec<T> {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn parse_lines(raw: &str) -> Vec<DeliveryNoteLine> {
    parse_json_list(raw)
}

pub fn parse_documentation(raw: &str) -> Vec<DocumentationEntry> {
    parse_json_list(raw)
}

/// Total shipped quantity per `(item, warehouse)` across non-deleted notes.
pub fn shipped_quantities<'a, I>(notes: I) -> HashMap<ProgressKey, i64>
where
    I: IntoIterator<Item = &'a delivery_note::Model>,
{
    let mut shipped: HashMap<ProgressKey, i64> = HashMap::new();
    for note in notes.into_iter().filter(|note| !note.is_deleted) {
        for line in parse_lines(&note.lines) {
            *shipped.entry((line.item_id, line.warehouse_id)).or_insert(0) += line.qty_shipped;
        }
    }
    shipped
}

/// Quantity still shippable for one `(item, warehouse)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableShipment {
    pub item_id: i64,
    pub warehouse_id: i64,
    pub warehouse_name: Option<String>,
    pub product_name: String,
    pub qty_target: i64,
    pub qty_completed: i64,
    pub qty_shipped: i64,
    pub qty_available: i64,
}

/// Every pair with a latest entry and something left to ship, in item then warehouse order.
pub fn available_shipments(
    view: &LatestProgressView,
    items: &[purchase_order_item::Model],
    shipped: &HashMap<ProgressKey, i64>,
    warehouse_names: &HashMap<i64, String>,
) -> Vec<AvailableShipment> {
    let mut available = Vec::new();
    for item in items {
        for entry in view.entries_for_item(item.id) {
            let completed = i64::from(entry.qty_completed);
            let already = shipped
                .get(&(item.id, entry.warehouse_id))
                .copied()
                .unwrap_or(0);
            let qty_available = (completed - already).max(0);
            if qty_available > 0 {
                available.push(AvailableShipment {
                    item_id: item.id,
                    warehouse_id: entry.warehouse_id,
                    warehouse_name: warehouse_names.get(&entry.warehouse_id).cloned(),
                    product_name: item.product_name.clone(),
                    qty_target: i64::from(item.qty),
                    qty_completed: completed,
                    qty_shipped: already,
                    qty_available,
                });
            }
        }
    }
    available
}

/// Caller-selected `(item, warehouse)` pair to ship; no quantity means everything available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ShipmentSelection {
    pub item_id: i64,
    #[serde(alias = "gudang_id")]
    pub warehouse_id: i64,
    #[serde(default, alias = "qty_kirim")]
    pub qty: Option<i64>,
}

/// Resolves selections into delivery-note lines, validated against current availability.
///
/// Repeated selections of the same pair draw from the same available quantity.
pub fn resolve_selections(
    available: &[AvailableShipment],
    selections: &[ShipmentSelection],
) -> Result<Vec<DeliveryNoteLine>, ServiceError> {
    if selections.is_empty() {
        return Err(ServiceError::validation(
            "select at least one item to ship",
        ));
    }

    let by_key: HashMap<ProgressKey, &AvailableShipment> = available
        .iter()
        .map(|entry| ((entry.item_id, entry.warehouse_id), entry))
        .collect();
    let mut used: HashMap<ProgressKey, i64> = HashMap::new();
    let mut lines = Vec::with_capacity(selections.len());

    for selection in selections {
        let key = (selection.item_id, selection.warehouse_id);
        let entry = by_key.get(&key).ok_or_else(|| {
            ServiceError::validation(format!(
                "item {} from warehouse {} is not available or already shipped",
                selection.item_id, selection.warehouse_id
            ))
        })?;

        let already_selected = used.get(&key).copied().unwrap_or(0);
        let left = entry.qty_available - already_selected;
        let qty = match selection.qty {
            Some(qty) if qty > 0 => qty,
            _ => left,
        };
        if left <= 0 || qty > left {
            return Err(ServiceError::exceeds(
                format!(
                    "requested quantity for item {} from warehouse {} exceeds the available {}",
                    selection.item_id,
                    selection.warehouse_id,
                    left.max(0)
                ),
                left.max(0),
            ));
        }

        *used.entry(key).or_insert(0) += qty;
        lines.push(DeliveryNoteLine {
            item_id: entry.item_id,
            warehouse_id: entry.warehouse_id,
            qty_shipped: qty,
            product_name: Some(entry.product_name.clone()),
            qty_target: Some(entry.qty_target),
            qty_completed: Some(entry.qty_completed),
            warehouse_name: entry.warehouse_name.clone(),
        });
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::super::progress::test_support::{at, entry};
    use super::*;
    use crate::entities::{
        delivery_note::DeliveryNoteStatus,
        purchase_order::Priority,
        purchase_order_item::ItemStatus,
    };
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn item(id: i64, qty: i32) -> purchase_order_item::Model {
        purchase_order_item::Model {
            id,
            purchase_order_id: 1,
            product_name: format!("Pipa {}", id),
            product_data: None,
            qty,
            unit_price: Decimal::ZERO,
            line_total: Decimal::ZERO,
            warehouse_id: Some(10),
            priority: Priority::Medium,
            note: None,
            target_date: None,
            status: ItemStatus::InProgress,
            started_at: None,
            completed_at: None,
            is_deleted: false,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn note(id: i64, lines: &str, is_deleted: bool) -> delivery_note::Model {
        delivery_note::Model {
            id,
            note_number: format!("{:02}/10/01/I/SJ-LR/2025", id),
            purchase_order_id: 1,
            po_number: "PO-1".into(),
            destination_address: "Jl. Raya 1".into(),
            note: None,
            lines: lines.into(),
            documentation: "[]".into(),
            author_id: 1,
            delivery_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            status: DeliveryNoteStatus::Draft,
            is_deleted,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    #[test]
    fn shipped_map_reads_legacy_keys_and_skips_deleted() {
        let notes = vec![
            note(1, r#"[{"item_id":1,"gudang_id":10,"qty_kirim":7}]"#, false),
            note(2, r#"[{"item_id":1,"warehouse_id":10,"qty_shipped":5}]"#, false),
            note(3, r#"[{"item_id":1,"warehouse_id":10,"qty_shipped":100}]"#, true),
            note(4, "not json", false),
        ];
        let shipped = shipped_quantities(&notes);
        assert_eq!(shipped.get(&(1, 10)), Some(&12));
        assert_eq!(shipped.len(), 1);
    }

    #[test]
    fn malformed_documentation_reads_empty() {
        assert!(parse_documentation("{oops").is_empty());
        assert!(parse_documentation("[]").is_empty());
    }

    #[test]
    fn availability_subtracts_shipped_and_drops_exhausted() {
        let view = LatestProgressView::from_entries(vec![
            entry(1, 1, 10, 30, 1),
            entry(2, 1, 11, 5, 1),
            entry(3, 2, 10, 0, 1),
        ]);
        let items = vec![item(1, 50), item(2, 10)];
        let shipped = HashMap::from([((1, 10), 12), ((1, 11), 9)]);
        let names = HashMap::from([(10, "Gudang A".to_string())]);

        let available = available_shipments(&view, &items, &shipped, &names);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].qty_available, 18);
        assert_eq!(available[0].warehouse_name.as_deref(), Some("Gudang A"));
    }

    fn eighteen_available() -> Vec<AvailableShipment> {
        let view = LatestProgressView::from_entries(vec![entry(1, 1, 10, 30, 1)]);
        let shipped = HashMap::from([((1, 10), 12)]);
        available_shipments(&view, &[item(1, 50)], &shipped, &HashMap::new())
    }

    #[test]
    fn selection_above_available_is_rejected() {
        let available = eighteen_available();
        let err = resolve_selections(
            &available,
            &[ShipmentSelection {
                item_id: 1,
                warehouse_id: 10,
                qty: Some(19),
            }],
        )
        .unwrap_err();
        assert_eq!(err.max_allowed(), Some(18));
    }

    #[test]
    fn missing_quantity_ships_everything_available() {
        let lines = resolve_selections(
            &eighteen_available(),
            &[ShipmentSelection {
                item_id: 1,
                warehouse_id: 10,
                qty: None,
            }],
        )
        .unwrap();
        assert_eq!(lines[0].qty_shipped, 18);
        assert_eq!(lines[0].qty_completed, Some(30));
    }

    #[test]
    fn repeated_selections_share_availability() {
        let available = eighteen_available();
        let pick = |qty| ShipmentSelection {
            item_id: 1,
            warehouse_id: 10,
            qty: Some(qty),
        };
        assert!(resolve_selections(&available, &[pick(10), pick(8)]).is_ok());
        let err = resolve_selections(&available, &[pick(10), pick(9)]).unwrap_err();
        assert_eq!(err.max_allowed(), Some(8));
    }

    #[test]
    fn unknown_pair_and_empty_selection_are_rejected() {
        let available = eighteen_available();
        assert!(resolve_selections(&available, &[]).is_err());
        assert!(resolve_selections(
            &available,
            &[ShipmentSelection {
                item_id: 1,
                warehouse_id: 11,
                qty: Some(1),
            }]
        )
        .is_err());
    }
}
