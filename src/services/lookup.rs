//! Store reads shared by the services. Every function takes any
//! `ConnectionTrait`, so the same query runs on the pool or inside a transaction.

use std::collections::{HashMap, HashSet};

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::{
    auth::WarehouseScope,
    entities::{delivery_note, production_progress, purchase_order, purchase_order_item, warehouse},
    errors::ServiceError,
};

pub async fn find_purchase_order<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<purchase_order::Model, ServiceError> {
    purchase_order::Entity::find_by_id(id)
        .filter(purchase_order::Column::IsDeleted.eq(false))
        .one(db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase order {} not found", id)))
}

pub async fn find_item<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<purchase_order_item::Model, ServiceError> {
    purchase_order_item::Entity::find_by_id(id)
        .filter(purchase_order_item::Column::IsDeleted.eq(false))
        .one(db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase order item {} not found", id)))
}

pub async fn find_warehouse<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<warehouse::Model, ServiceError> {
    warehouse::Entity::find_by_id(id)
        .filter(warehouse::Column::IsDeleted.eq(false))
        .one(db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", id)))
}

pub async fn find_delivery_note<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<delivery_note::Model, ServiceError> {
    delivery_note::Entity::find_by_id(id)
        .filter(delivery_note::Column::IsDeleted.eq(false))
        .one(db)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Delivery note {} not found", id)))
}

/// Non-deleted items of an order in creation order.
pub async fn items_for_order<C: ConnectionTrait>(
    db: &C,
    purchase_order_id: i64,
) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
    purchase_order_item::Entity::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
        .filter(purchase_order_item::Column::IsDeleted.eq(false))
        .order_by_asc(purchase_order_item::Column::CreatedAt)
        .order_by_asc(purchase_order_item::Column::Id)
        .all(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Every progress row of the given items, newest first.
pub async fn progress_rows<C: ConnectionTrait>(
    db: &C,
    item_ids: &[i64],
) -> Result<Vec<production_progress::Model>, ServiceError> {
    if item_ids.is_empty() {
        return Ok(Vec::new());
    }
    production_progress::Entity::find()
        .filter(production_progress::Column::ItemId.is_in(item_ids.iter().copied()))
        .order_by_desc(production_progress::Column::ProgressDate)
        .order_by_desc(production_progress::Column::Id)
        .all(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Non-deleted delivery notes of an order, newest first.
pub async fn delivery_notes_for_order<C: ConnectionTrait>(
    db: &C,
    purchase_order_id: i64,
) -> Result<Vec<delivery_note::Model>, ServiceError> {
    delivery_note::Entity::find()
        .filter(delivery_note::Column::PurchaseOrderId.eq(purchase_order_id))
        .filter(delivery_note::Column::IsDeleted.eq(false))
        .order_by_desc(delivery_note::Column::CreatedAt)
        .order_by_desc(delivery_note::Column::Id)
        .all(db)
        .await
        .map_err(ServiceError::db_error)
}

/// Non-deleted warehouses ordered by name.
pub async fn active_warehouses<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<warehouse::Model>, ServiceError> {
    warehouse::Entity::find()
        .filter(warehouse::Column::IsDeleted.eq(false))
        .order_by_asc(warehouse::Column::Name)
        .all(db)
        .await
        .map_err(ServiceError::db_error)
}

pub fn warehouse_names(warehouses: &[warehouse::Model]) -> HashMap<i64, String> {
    warehouses
        .iter()
        .map(|warehouse| (warehouse.id, warehouse.name.clone()))
        .collect()
}

/// Checks that the caller manages the order's primary warehouse.
pub fn ensure_order_access(
    scope: &WarehouseScope,
    order: &purchase_order::Model,
) -> Result<(), ServiceError> {
    scope.require(order.primary_warehouse_id, "purchase order")
}

/// Checks that the caller manages any warehouse the order touches: its
/// primary warehouse, an item's assigned warehouse, or a warehouse that ever
/// recorded progress for one of its items.
pub async fn ensure_transfer_access<C: ConnectionTrait>(
    db: &C,
    scope: &WarehouseScope,
    order: &purchase_order::Model,
) -> Result<(), ServiceError> {
    if scope.contains(order.primary_warehouse_id) {
        return Ok(());
    }

    let items = items_for_order(db, order.id).await?;
    if scope.any_of(items.iter().filter_map(|item| item.warehouse_id)) {
        return Ok(());
    }

    let item_ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    let progress_warehouses: HashSet<i64> = progress_rows(db, &item_ids)
        .await?
        .into_iter()
        .map(|row| row.warehouse_id)
        .collect();
    scope.require_any(progress_warehouses, "purchase order")
}
