use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A production and fulfilment location (gudang).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    /// User responsible for the warehouse; grants that user access to it.
    pub manager_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::production_progress::Entity")]
    ProductionProgress,
}

impl Related<super::production_progress::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionProgress.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
