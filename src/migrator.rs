use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_reference_tables::Migration),
            Box::new(m20240301_000002_create_purchase_tables::Migration),
            Box::new(m20240301_000003_create_stock_tables::Migration),
            Box::new(m20240301_000004_create_sales_tables::Migration),
            Box::new(m20240301_000005_create_ledger_tables::Migration),
            Box::new(m20240301_000006_create_serial_counters::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_reference_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Suppliers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Suppliers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Suppliers::Name).string().not_null())
                        .col(ColumnDef::new(Suppliers::Phone).string().null())
                        .col(ColumnDef::new(Suppliers::Address).string().null())
                        .col(
                            ColumnDef::new(Suppliers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Suppliers::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::Address).string().null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Category).string().null())
                        .col(ColumnDef::new(Products::Unit).string().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Storages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Storages::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Storages::Name).string().not_null())
                        .col(ColumnDef::new(Storages::Location).string().null())
                        .col(
                            ColumnDef::new(Storages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Storages::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_suppliers_name")
                        .table(Suppliers::Table)
                        .col(Suppliers::Name)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_name")
                        .table(Customers::Table)
                        .col(Customers::Name)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_name")
                        .table(Products::Table)
                        .col(Products::Name)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_storages_name")
                        .table(Storages::Table)
                        .col(Storages::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Storages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Suppliers {
        Table,
        Id,
        Name,
        Phone,
        Address,
        CreatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Phone,
        Address,
        CreatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Category,
        Unit,
        CreatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Storages {
        Table,
        Id,
        Name,
        Location,
        CreatedAt,
        DeletedAt,
    }
}

mod m20240301_000002_create_purchase_tables {
    use super::m20240301_000001_create_reference_tables::{Products, Suppliers};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_purchase_tables"
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
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::OrderDate).date().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PaymentMethod)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::PaymentDueDate).date().null())
                        .col(ColumnDef::new(PurchaseOrders::Notes).text().null())
                        .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::CheckedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CheckedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CompletedBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::CancelReason).text().null())
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
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_orders_supplier_id")
                                .from(PurchaseOrders::Table, PurchaseOrders::SupplierId)
                                .to(Suppliers::Table, Suppliers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_supplier_id")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::SupplierId)
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
                        .table(PurchaseOrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .check(Expr::col(PurchaseOrderDetails::Quantity).gt(0)),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::Price)
                                .decimal_len(19, 4)
                                .not_null()
                                .check(Expr::col(PurchaseOrderDetails::Price).gt(0)),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderDetails::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_details_order_id")
                                .from(
                                    PurchaseOrderDetails::Table,
                                    PurchaseOrderDetails::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_details_product_id")
                                .from(PurchaseOrderDetails::Table, PurchaseOrderDetails::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_details_order_id")
                        .table(PurchaseOrderDetails::Table)
                        .col(PurchaseOrderDetails::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrders {
        Table,
        Id,
        SerialNumber,
        SupplierId,
        OrderDate,
        Status,
        TotalAmount,
        PaymentMethod,
        PaymentDueDate,
        Notes,
        CreatedBy,
        CheckedBy,
        CheckedAt,
        CompletedBy,
        CompletedAt,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrderDetails {
        Table,
        Id,
        PurchaseOrderId,
        ProductId,
        Quantity,
        Price,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_stock_tables {
    use super::m20240301_000001_create_reference_tables::{Products, Storages};
    use super::m20240301_000002_create_purchase_tables::{PurchaseOrderDetails, PurchaseOrders};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductBatches::Sku).string_len(64).not_null())
                        .col(ColumnDef::new(ProductBatches::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(ProductBatches::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::PurchaseOrderDetailId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::InitialQuantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::CurrentQuantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .check(Expr::col(ProductBatches::CurrentQuantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::Price)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_batches_product_id")
                                .from(ProductBatches::Table, ProductBatches::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_batches_purchase_order_id")
                                .from(ProductBatches::Table, ProductBatches::PurchaseOrderId)
                                .to(PurchaseOrders::Table, PurchaseOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_batches_detail_id")
                                .from(ProductBatches::Table, ProductBatches::PurchaseOrderDetailId)
                                .to(PurchaseOrderDetails::Table, PurchaseOrderDetails::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_batches_product_id")
                        .table(ProductBatches::Table)
                        .col(ProductBatches::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_batches_detail_id")
                        .table(ProductBatches::Table)
                        .col(ProductBatches::PurchaseOrderDetailId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BatchStorages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BatchStorages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BatchStorages::BatchId).uuid().not_null())
                        .col(ColumnDef::new(BatchStorages::StorageId).uuid().not_null())
                        .col(
                            ColumnDef::new(BatchStorages::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0)
                                .check(Expr::col(BatchStorages::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(BatchStorages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BatchStorages::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_batch_storages_batch_id")
                                .from(BatchStorages::Table, BatchStorages::BatchId)
                                .to(ProductBatches::Table, ProductBatches::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_batch_storages_storage_id")
                                .from(BatchStorages::Table, BatchStorages::StorageId)
                                .to(Storages::Table, Storages::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // Upserts resolve conflicts on this pair
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("uq_batch_storages_batch_storage")
                        .table(BatchStorages::Table)
                        .col(BatchStorages::BatchId)
                        .col(BatchStorages::StorageId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_batch_storages_storage_id")
                        .table(BatchStorages::Table)
                        .col(BatchStorages::StorageId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BatchStorages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductBatches {
        Table,
        Id,
        Sku,
        ProductId,
        PurchaseOrderId,
        PurchaseOrderDetailId,
        InitialQuantity,
        CurrentQuantity,
        Price,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum BatchStorages {
        Table,
        Id,
        BatchId,
        StorageId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_sales_tables {
    use super::m20240301_000001_create_reference_tables::Customers;
    use super::m20240301_000003_create_stock_tables::BatchStorages;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SalesOrders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesOrders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(SalesOrders::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(SalesOrders::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::PaymentMethod)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::PaymentDueDate).date().null())
                        .col(ColumnDef::new(SalesOrders::Notes).text().null())
                        .col(ColumnDef::new(SalesOrders::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(SalesOrders::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CancelReason).text().null())
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_orders_customer_id")
                                .from(SalesOrders::Table, SalesOrders::CustomerId)
                                .to(Customers::Table, Customers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_customer_id")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_status")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderDetails::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderDetails::SalesOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderDetails::BatchStorageId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderDetails::BatchId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderDetails::StorageId).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderDetails::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrderDetails::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .check(Expr::col(SalesOrderDetails::Quantity).gt(0)),
                        )
                        .col(
                            ColumnDef::new(SalesOrderDetails::Price)
                                .decimal_len(19, 4)
                                .not_null()
                                .check(Expr::col(SalesOrderDetails::Price).gt(0)),
                        )
                        .col(
                            ColumnDef::new(SalesOrderDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderDetails::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_details_order_id")
                                .from(SalesOrderDetails::Table, SalesOrderDetails::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_details_batch_storage_id")
                                .from(SalesOrderDetails::Table, SalesOrderDetails::BatchStorageId)
                                .to(BatchStorages::Table, BatchStorages::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_order_details_order_id")
                        .table(SalesOrderDetails::Table)
                        .col(SalesOrderDetails::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesInvoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SalesInvoices::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(SalesInvoices::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesInvoices::SalesOrderId).uuid().not_null())
                        .col(ColumnDef::new(SalesInvoices::InvoiceDate).date().not_null())
                        .col(
                            ColumnDef::new(SalesInvoices::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesInvoices::Status).string_len(16).not_null())
                        .col(ColumnDef::new(SalesInvoices::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(SalesInvoices::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesInvoices::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesInvoices::CancelReason).text().null())
                        .col(
                            ColumnDef::new(SalesInvoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_invoices_order_id")
                                .from(SalesInvoices::Table, SalesInvoices::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_invoices_order_id")
                        .table(SalesInvoices::Table)
                        .col(SalesInvoices::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryNotes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(DeliveryNotes::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(DeliveryNotes::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(DeliveryNotes::SalesOrderId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryNotes::SalesInvoiceId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryNotes::DeliveryDate).date().not_null())
                        .col(ColumnDef::new(DeliveryNotes::Recipient).string().null())
                        .col(ColumnDef::new(DeliveryNotes::Address).string().null())
                        .col(ColumnDef::new(DeliveryNotes::Status).string_len(16).not_null())
                        .col(ColumnDef::new(DeliveryNotes::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(DeliveryNotes::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(DeliveryNotes::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(DeliveryNotes::CancelReason).text().null())
                        .col(
                            ColumnDef::new(DeliveryNotes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_notes_order_id")
                                .from(DeliveryNotes::Table, DeliveryNotes::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_notes_invoice_id")
                                .from(DeliveryNotes::Table, DeliveryNotes::SalesInvoiceId)
                                .to(SalesInvoices::Table, SalesInvoices::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_notes_order_id")
                        .table(DeliveryNotes::Table)
                        .col(DeliveryNotes::SalesOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryNotes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesInvoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrderDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrders {
        Table,
        Id,
        SerialNumber,
        CustomerId,
        OrderDate,
        Status,
        TotalAmount,
        PaymentMethod,
        PaymentDueDate,
        Notes,
        CreatedBy,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrderDetails {
        Table,
        Id,
        SalesOrderId,
        BatchStorageId,
        BatchId,
        StorageId,
        ProductId,
        Quantity,
        Price,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesInvoices {
        Table,
        Id,
        SerialNumber,
        SalesOrderId,
        InvoiceDate,
        Amount,
        Status,
        CreatedBy,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliveryNotes {
        Table,
        Id,
        SerialNumber,
        SalesOrderId,
        SalesInvoiceId,
        DeliveryDate,
        Recipient,
        Address,
        Status,
        CreatedBy,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
    }
}

mod m20240301_000005_create_ledger_tables {
    use super::m20240301_000002_create_purchase_tables::{PurchaseOrderDetails, PurchaseOrders};
    use super::m20240301_000003_create_stock_tables::ProductBatches;
    use super::m20240301_000004_create_sales_tables::{SalesOrderDetails, SalesOrders};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(InventoryLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(InventoryLogs::BatchId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::StorageId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::TargetStorageId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::ActorId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLogs::PurchaseOrderId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::SalesOrderId).uuid().null())
                        .col(ColumnDef::new(InventoryLogs::Action).string_len(16).not_null())
                        .col(
                            ColumnDef::new(InventoryLogs::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLogs::Description).text().null())
                        .col(
                            ColumnDef::new(InventoryLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_logs_batch_id")
                                .from(InventoryLogs::Table, InventoryLogs::BatchId)
                                .to(ProductBatches::Table, ProductBatches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_inventory_logs_batch_id", InventoryLogs::BatchId),
                ("idx_inventory_logs_purchase_order_id", InventoryLogs::PurchaseOrderId),
                ("idx_inventory_logs_sales_order_id", InventoryLogs::SalesOrderId),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(InventoryLogs::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(FinancialLedger::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FinancialLedger::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(FinancialLedger::ActorId).uuid().not_null())
                        .col(ColumnDef::new(FinancialLedger::Kind).string_len(32).not_null())
                        .col(
                            ColumnDef::new(FinancialLedger::Direction)
                                .string_len(8)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinancialLedger::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(FinancialLedger::PurchaseOrderId).uuid().null())
                        .col(ColumnDef::new(FinancialLedger::SalesOrderId).uuid().null())
                        .col(ColumnDef::new(FinancialLedger::ReversesEntryId).uuid().null())
                        .col(ColumnDef::new(FinancialLedger::Description).text().null())
                        .col(
                            ColumnDef::new(FinancialLedger::IsSystem)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(FinancialLedger::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_financial_ledger_purchase_order_id", FinancialLedger::PurchaseOrderId),
                ("idx_financial_ledger_sales_order_id", FinancialLedger::SalesOrderId),
                ("idx_financial_ledger_reverses_entry_id", FinancialLedger::ReversesEntryId),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(FinancialLedger::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::PurchaseOrderDetailId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderReturns::Reason).text().null())
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderReturns::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrderReturns::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PurchaseOrderReturns::CancelReason).text().null())
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_returns_order_id")
                                .from(
                                    PurchaseOrderReturns::Table,
                                    PurchaseOrderReturns::PurchaseOrderId,
                                )
                                .to(PurchaseOrders::Table, PurchaseOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_returns_detail_id")
                                .from(
                                    PurchaseOrderReturns::Table,
                                    PurchaseOrderReturns::PurchaseOrderDetailId,
                                )
                                .to(PurchaseOrderDetails::Table, PurchaseOrderDetails::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderReturnBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::BatchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::StorageId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderReturnBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_order_return_batches_return_id")
                                .from(
                                    PurchaseOrderReturnBatches::Table,
                                    PurchaseOrderReturnBatches::ReturnId,
                                )
                                .to(PurchaseOrderReturns::Table, PurchaseOrderReturns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderReturns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderReturns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturns::SerialNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SalesOrderReturns::SalesOrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(SalesOrderReturns::SalesOrderDetailId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderReturns::Source).string_len(16).not_null())
                        .col(ColumnDef::new(SalesOrderReturns::SalesInvoiceId).uuid().null())
                        .col(ColumnDef::new(SalesOrderReturns::DeliveryNoteId).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrderReturns::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturns::Amount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrderReturns::Reason).text().null())
                        .col(ColumnDef::new(SalesOrderReturns::Status).string_len(16).not_null())
                        .col(ColumnDef::new(SalesOrderReturns::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(SalesOrderReturns::CancelledBy).uuid().null())
                        .col(
                            ColumnDef::new(SalesOrderReturns::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SalesOrderReturns::CancelReason).text().null())
                        .col(
                            ColumnDef::new(SalesOrderReturns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_returns_order_id")
                                .from(SalesOrderReturns::Table, SalesOrderReturns::SalesOrderId)
                                .to(SalesOrders::Table, SalesOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_returns_detail_id")
                                .from(
                                    SalesOrderReturns::Table,
                                    SalesOrderReturns::SalesOrderDetailId,
                                )
                                .to(SalesOrderDetails::Table, SalesOrderDetails::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderReturnBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::ReturnId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::BatchId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::StorageId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderReturnBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_order_return_batches_return_id")
                                .from(
                                    SalesOrderReturnBatches::Table,
                                    SalesOrderReturnBatches::ReturnId,
                                )
                                .to(SalesOrderReturns::Table, SalesOrderReturns::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_returns_order_id")
                        .table(PurchaseOrderReturns::Table)
                        .col(PurchaseOrderReturns::PurchaseOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_order_returns_order_id")
                        .table(SalesOrderReturns::Table)
                        .col(SalesOrderReturns::SalesOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderReturnBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrderReturns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrderReturnBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrderReturns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(FinancialLedger::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryLogs {
        Table,
        Id,
        BatchId,
        StorageId,
        TargetStorageId,
        ActorId,
        PurchaseOrderId,
        SalesOrderId,
        Action,
        Quantity,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum FinancialLedger {
        Table,
        Id,
        ActorId,
        Kind,
        Direction,
        Amount,
        PurchaseOrderId,
        SalesOrderId,
        ReversesEntryId,
        Description,
        IsSystem,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderReturns {
        Table,
        Id,
        SerialNumber,
        PurchaseOrderId,
        PurchaseOrderDetailId,
        Quantity,
        Amount,
        Reason,
        Status,
        CreatedBy,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderReturnBatches {
        Table,
        Id,
        ReturnId,
        BatchId,
        StorageId,
        Quantity,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderReturns {
        Table,
        Id,
        SerialNumber,
        SalesOrderId,
        SalesOrderDetailId,
        Source,
        SalesInvoiceId,
        DeliveryNoteId,
        Quantity,
        Amount,
        Reason,
        Status,
        CreatedBy,
        CancelledBy,
        CancelledAt,
        CancelReason,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SalesOrderReturnBatches {
        Table,
        Id,
        ReturnId,
        BatchId,
        StorageId,
        Quantity,
        CreatedAt,
    }
}

mod m20240301_000006_create_serial_counters {
    use sea_orm_migration::prelude::*;

    /// Prefixes seeded so the first document of each kind only needs an update.
    const PREFIXES: [&str; 6] = ["PO", "SO", "SI", "DN", "PR", "SR"];

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_serial_counters"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SerialCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SerialCounters::Prefix)
                                .string_len(8)
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialCounters::LastValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SerialCounters::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            let now = chrono::Utc::now();
            let mut seed = Query::insert();
            seed.into_table(SerialCounters::Table).columns([
                SerialCounters::Prefix,
                SerialCounters::LastValue,
                SerialCounters::UpdatedAt,
            ]);
            for prefix in PREFIXES {
                seed.values([prefix.into(), 0i64.into(), now.into()])
                    .map_err(|e| DbErr::Migration(e.to_string()))?;
            }
            manager.exec_stmt(seed.to_owned()).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SerialCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SerialCounters {
        Table,
        Prefix,
        LastValue,
        UpdatedAt,
    }
}
