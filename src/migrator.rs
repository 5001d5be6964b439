use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_fulfillment_tables::Migration),
            Box::new(m20240601_000002_create_inventory_ledger_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_fulfillment_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_fulfillment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FulfillmentOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FulfillmentOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FulfillmentOrders::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(FulfillmentOrders::Reference).string().not_null())
                        .col(ColumnDef::new(FulfillmentOrders::Counterparty).string().null())
                        .col(ColumnDef::new(FulfillmentOrders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(FulfillmentOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(FulfillmentOrders::DueDate).date().null())
                        .col(ColumnDef::new(FulfillmentOrders::LastFulfilledOn).date().null())
                        .col(
                            ColumnDef::new(FulfillmentOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(FulfillmentOrders::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FulfillmentOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FulfillmentOrders::UpdatedAt)
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
                        .name("idx_fulfillment_orders_kind_status")
                        .table(FulfillmentOrders::Table)
                        .col(FulfillmentOrders::Kind)
                        .col(FulfillmentOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_fulfillment_orders_kind_reference")
                        .table(FulfillmentOrders::Table)
                        .col(FulfillmentOrders::Kind)
                        .col(FulfillmentOrders::Reference)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_fulfillment_orders_due_date")
                        .table(FulfillmentOrders::Table)
                        .col(FulfillmentOrders::DueDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLineItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLineItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLineItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLineItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderLineItems::OrderedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLineItems::FulfilledQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderLineItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLineItems::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OrderLineItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_line_items_order_id")
                                .from(OrderLineItems::Table, OrderLineItems::OrderId)
                                .to(FulfillmentOrders::Table, FulfillmentOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_line_items_order_id")
                        .table(OrderLineItems::Table)
                        .col(OrderLineItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_line_items_product_id")
                        .table(OrderLineItems::Table)
                        .col(OrderLineItems::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(FulfillmentOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum FulfillmentOrders {
        Table,
        Id,
        Kind,
        Reference,
        Counterparty,
        Status,
        OrderDate,
        DueDate,
        LastFulfilledOn,
        CancelledAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLineItems {
        Table,
        Id,
        OrderId,
        ProductId,
        OrderedQuantity,
        FulfilledQuantity,
        UnitPrice,
        Position,
        CreatedAt,
    }
}

mod m20240601_000002_create_inventory_ledger_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_inventory_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLevels::ProductId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::OnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::Reserved)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::Incoming)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryAdjustments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryAdjustments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryAdjustments::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryAdjustments::OrderKind)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::LineItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::Direction)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryAdjustments::CreatedAt)
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
                        .name("idx_inventory_adjustments_order_id")
                        .table(InventoryAdjustments::Table)
                        .col(InventoryAdjustments::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryAdjustments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryLevels {
        Table,
        ProductId,
        OnHand,
        Reserved,
        Incoming,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryAdjustments {
        Table,
        Id,
        OrderId,
        OrderKind,
        LineItemId,
        ProductId,
        Direction,
        Quantity,
        CreatedAt,
    }
}
