use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_warehouses_table::Migration),
            Box::new(m20250101_000002_create_purchase_order_tables::Migration),
            Box::new(m20250101_000003_create_production_progress_table::Migration),
            Box::new(m20250101_000004_create_delivery_notes_table::Migration),
        ]
    }
}

mod m20250101_000001_create_warehouses_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_warehouses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Location).string().null())
                        .col(ColumnDef::new(Warehouses::ManagerId).big_integer().null())
                        .col(
                            ColumnDef::new(Warehouses::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Warehouses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warehouses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Access lookups resolve a user's warehouses by manager
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_warehouses_manager_id")
                        .table(Warehouses::Table)
                        .col(Warehouses::ManagerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Warehouses {
        Table,
        Id,
        Name,
        Location,
        ManagerId,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_purchase_order_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_purchase_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::QuotationId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(20)
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::Priority)
                                .string_len(10)
                                .not_null()
                                .default("medium"),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PrimaryWarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::PoDate).date().null())
                        .col(ColumnDef::new(PurchaseOrders::TargetDate).date().null())
                        .col(ColumnDef::new(PurchaseOrders::Note).text().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedBy)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ApprovedBy)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledBy)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::ProductData).text().null())
                        .col(ColumnDef::new(PurchaseOrderItems::Qty).integer().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitPrice)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::LineTotal)
                                .decimal_len(18, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::WarehouseId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Priority)
                                .string_len(10)
                                .not_null()
                                .default("medium"),
                        )
                        .col(ColumnDef::new(PurchaseOrderItems::Note).text().null())
                        .col(ColumnDef::new(PurchaseOrderItems::TargetDate).date().null())
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Status)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::StartedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_items_purchase_order")
                                .from(
                                    PurchaseOrderItems::Table,
                                    PurchaseOrderItems::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_items_purchase_order_id")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        QuotationId,
        Status,
        Priority,
        PrimaryWarehouseId,
        PoDate,
        TargetDate,
        Note,
        CreatedBy,
        ApprovedBy,
        ApprovedAt,
        CancelledBy,
        CancelledAt,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        ProductName,
        ProductData,
        Qty,
        UnitPrice,
        LineTotal,
        WarehouseId,
        Priority,
        Note,
        TargetDate,
        Status,
        StartedAt,
        CompletedAt,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_production_progress_table {

    use super::m20250101_000002_create_purchase_order_tables::PurchaseOrderItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_production_progress_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionProgress::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionProgress::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::WarehouseId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::QtyCompleted)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::QtyTarget)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProductionProgress::Note).text().null())
                        .col(
                            ColumnDef::new(ProductionProgress::IsTransferDestination)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::ReleasedTo)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::UpdatedBy)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::ProgressDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionProgress::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_progress_item")
                                .from(ProductionProgress::Table, ProductionProgress::ItemId)
                                .to(PurchaseOrderItems::Table, PurchaseOrderItems::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // Latest-entry lookups scan by item, then warehouse, newest first
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_progress_item_warehouse")
                        .table(ProductionProgress::Table)
                        .col(ProductionProgress::ItemId)
                        .col(ProductionProgress::WarehouseId)
                        .col(ProductionProgress::ProgressDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionProgress::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ProductionProgress {
        Table,
        Id,
        ItemId,
        WarehouseId,
        QtyCompleted,
        QtyTarget,
        Note,
        IsTransferDestination,
        ReleasedTo,
        UpdatedBy,
        ProgressDate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000004_create_delivery_notes_table {

    use super::m20250101_000002_create_purchase_order_tables::PurchaseOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_delivery_notes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeliveryNotes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryNotes::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::NoteNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::PurchaseOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryNotes::PoNumber).string().not_null())
                        .col(
                            ColumnDef::new(DeliveryNotes::DestinationAddress)
                                .text()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryNotes::Note).text().null())
                        .col(ColumnDef::new(DeliveryNotes::Lines).text().not_null())
                        .col(
                            ColumnDef::new(DeliveryNotes::Documentation)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::AuthorId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::DeliveryDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::Status)
                                .string_len(20)
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryNotes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_notes_purchase_order")
                                .from(DeliveryNotes::Table, DeliveryNotes::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_notes_purchase_order_id")
                        .table(DeliveryNotes::Table)
                        .col(DeliveryNotes::PurchaseOrderId)
                        .to_owned(),
                )
                .await?;

            // Daily sequence numbering counts notes by creation time
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_notes_created_at")
                        .table(DeliveryNotes::Table)
                        .col(DeliveryNotes::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryNotes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DeliveryNotes {
        Table,
        Id,
        NoteNumber,
        PurchaseOrderId,
        PoNumber,
        DestinationAddress,
        Note,
        Lines,
        Documentation,
        AuthorId,
        DeliveryDate,
        Status,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
    }
}
