use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only production progress record for an (item, warehouse) pair.
///
/// Rows are never deleted. The only in-place change is the release marking a
/// transfer writes onto the source warehouse's latest row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_progress")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: i64,
    pub warehouse_id: i64,
    pub qty_completed: i32,
    pub qty_target: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    /// Set when the row was written as the receiving side of a transfer.
    pub is_transfer_destination: bool,
    /// Warehouse the remaining work was released to, on the sending side.
    pub released_to: Option<i64>,
    pub updated_by: i64,
    pub progress_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order_item::Entity",
        from = "Column::ItemId",
        to = "super::purchase_order_item::Column::Id"
    )]
    Item,
    #[sea_orm(
        belongs_to = "super::warehouse::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouse::Column::Id"
    )]
    Warehouse,
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::warehouse::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
