use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_pcb_types_table::Migration),
            Box::new(m20250101_000002_create_work_orders_table::Migration),
            Box::new(m20250101_000003_create_assembly_tables::Migration),
            Box::new(m20250101_000004_create_completed_assemblies_table::Migration),
            Box::new(m20250101_000005_add_live_sensor_and_archive_version::Migration),
        ]
    }
}

mod m20250101_000001_create_pcb_types_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_pcb_types_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PcbTypes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PcbTypes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(PcbTypes::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(PcbTypes::Name).string().not_null())
                        .col(ColumnDef::new(PcbTypes::Description).text().null())
                        .col(ColumnDef::new(PcbTypes::Prefix).string().not_null())
                        .col(ColumnDef::new(PcbTypes::BarcodeMarker).string().null())
                        .col(
                            ColumnDef::new(PcbTypes::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(PcbTypes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PcbTypes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PcbTypes::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum PcbTypes {
        Table,
        Id,
        Code,
        Name,
        Description,
        Prefix,
        BarcodeMarker,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_work_orders_table {

    use super::m20250101_000001_create_pcb_types_table::PcbTypes;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_work_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WorkOrders::ItemCode).string().not_null())
                        .col(ColumnDef::new(WorkOrders::Product).string().not_null())
                        .col(ColumnDef::new(WorkOrders::PcbTypeId).uuid().null())
                        .col(ColumnDef::new(WorkOrders::Description).text().null())
                        .col(ColumnDef::new(WorkOrders::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(WorkOrders::CompletedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::Status)
                                .string()
                                .not_null()
                                .default("Pending"),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::Priority)
                                .string()
                                .not_null()
                                .default("normal"),
                        )
                        .col(ColumnDef::new(WorkOrders::Barcode).string().null())
                        .col(ColumnDef::new(WorkOrders::MachineNo).string().null())
                        .col(ColumnDef::new(WorkOrders::CustomerName).string().null())
                        .col(ColumnDef::new(WorkOrders::TargetDate).date().null())
                        .col(ColumnDef::new(WorkOrders::ReleasedBy).string().null())
                        .col(ColumnDef::new(WorkOrders::Remarks).text().null())
                        .col(
                            ColumnDef::new(WorkOrders::IsRework)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(WorkOrders::OriginalWorkOrderId).uuid().null())
                        .col(ColumnDef::new(WorkOrders::SourceAssemblyId).uuid().null())
                        .col(ColumnDef::new(WorkOrders::ReworkNotes).text().null())
                        .col(
                            ColumnDef::new(WorkOrders::AssemblyStartTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::ScannedComponents).json().not_null())
                        .col(ColumnDef::new(WorkOrders::CompletedBy).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(WorkOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(
                            Expr::col(WorkOrders::CompletedQuantity)
                                .gte(0)
                                .and(
                                    Expr::col(WorkOrders::CompletedQuantity)
                                        .lte(Expr::col(WorkOrders::Quantity)),
                                ),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_work_orders_pcb_type_id")
                                .from(WorkOrders::Table, WorkOrders::PcbTypeId)
                                .to(PcbTypes::Table, PcbTypes::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_work_orders_original_work_order_id")
                                .from(WorkOrders::Table, WorkOrders::OriginalWorkOrderId)
                                .to(WorkOrders::Table, WorkOrders::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_status")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_item_code")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::ItemCode)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_original_work_order_id")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::OriginalWorkOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum WorkOrders {
        Table,
        Id,
        ItemCode,
        Product,
        PcbTypeId,
        Description,
        Quantity,
        CompletedQuantity,
        Status,
        Priority,
        Barcode,
        MachineNo,
        CustomerName,
        TargetDate,
        ReleasedBy,
        Remarks,
        IsRework,
        OriginalWorkOrderId,
        SourceAssemblyId,
        ReworkNotes,
        AssemblyStartTime,
        ScannedComponents,
        CompletedBy,
        CompletedAt,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_assembly_tables {

    use super::m20250101_000002_create_work_orders_table::WorkOrders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_assembly_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AssemblyProcesses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyProcesses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::SerialNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::WorkOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::SequenceNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::Status)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::QuantityCompleted)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::CurrentSensorIndex)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::StartedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::CreatedBy)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyProcesses::Notes).text().null())
                        .col(
                            ColumnDef::new(AssemblyProcesses::RejectionReason)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyProcesses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_processes_work_order_id")
                                .from(AssemblyProcesses::Table, AssemblyProcesses::WorkOrderId)
                                .to(WorkOrders::Table, WorkOrders::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // Backstops for the per-work-order lock: a racing writer fails here instead of
            // producing a duplicate unit.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assembly_processes_work_order_sequence")
                        .table(AssemblyProcesses::Table)
                        .col(AssemblyProcesses::WorkOrderId)
                        .col(AssemblyProcesses::SequenceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assembly_processes_work_order_serial")
                        .table(AssemblyProcesses::Table)
                        .col(AssemblyProcesses::WorkOrderId)
                        .col(AssemblyProcesses::SerialNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assembly_processes_serial_number")
                        .table(AssemblyProcesses::Table)
                        .col(AssemblyProcesses::SerialNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ScannedParts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ScannedParts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScannedParts::AssemblyProcessId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ScannedParts::PartCode).string().not_null())
                        .col(ColumnDef::new(ScannedParts::SensorId).integer().null())
                        .col(ColumnDef::new(ScannedParts::Operator).string().not_null())
                        .col(
                            ColumnDef::new(ScannedParts::ScanTime)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ScannedParts::Replaced)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ScannedParts::ReplacedWith).string().null())
                        .col(ColumnDef::new(ScannedParts::ReplaceReason).text().null())
                        .col(
                            ColumnDef::new(ScannedParts::ReplaceTime)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_scanned_parts_assembly_process_id")
                                .from(ScannedParts::Table, ScannedParts::AssemblyProcessId)
                                .to(AssemblyProcesses::Table, AssemblyProcesses::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_scanned_parts_assembly_sensor")
                        .table(ScannedParts::Table)
                        .col(ScannedParts::AssemblyProcessId)
                        .col(ScannedParts::SensorId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AssemblyLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyLogs::AssemblyProcessId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyLogs::Action).string().not_null())
                        .col(ColumnDef::new(AssemblyLogs::Details).text().not_null())
                        .col(ColumnDef::new(AssemblyLogs::Operator).string().not_null())
                        .col(
                            ColumnDef::new(AssemblyLogs::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_logs_assembly_process_id")
                                .from(AssemblyLogs::Table, AssemblyLogs::AssemblyProcessId)
                                .to(AssemblyProcesses::Table, AssemblyProcesses::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assembly_logs_assembly_timestamp")
                        .table(AssemblyLogs::Table)
                        .col(AssemblyLogs::AssemblyProcessId)
                        .col(AssemblyLogs::Timestamp)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AssemblyLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ScannedParts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AssemblyProcesses::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum AssemblyProcesses {
        Table,
        Id,
        SerialNumber,
        WorkOrderId,
        SequenceNumber,
        Status,
        QuantityCompleted,
        CurrentSensorIndex,
        StartedAt,
        CompletedAt,
        CreatedBy,
        Notes,
        RejectionReason,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum ScannedParts {
        Table,
        Id,
        AssemblyProcessId,
        PartCode,
        SensorId,
        Operator,
        ScanTime,
        Replaced,
        ReplacedWith,
        ReplaceReason,
        ReplaceTime,
    }

    #[derive(Iden)]
    enum AssemblyLogs {
        Table,
        Id,
        AssemblyProcessId,
        Action,
        Details,
        Operator,
        Timestamp,
    }
}

mod m20250101_000004_create_completed_assemblies_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_completed_assemblies_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CompletedAssemblies::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CompletedAssemblies::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::WorkOrderRef)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::AssemblyProcessId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(CompletedAssemblies::Product).string().not_null())
                        .col(ColumnDef::new(CompletedAssemblies::ItemCode).string().not_null())
                        .col(
                            ColumnDef::new(CompletedAssemblies::SerialNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::BarcodeNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::CompletedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::CompletedBy)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CompletedAssemblies::Zone).string().not_null())
                        .col(
                            ColumnDef::new(CompletedAssemblies::IsRework)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::Reworked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::OriginalAssemblyId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(CompletedAssemblies::ReworkNotes).text().null())
                        .col(ColumnDef::new(CompletedAssemblies::ReworkedBy).string().null())
                        .col(
                            ColumnDef::new(CompletedAssemblies::ReworkedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::ScannedComponents)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::ReworkedComponents)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::PreviousComponents)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CompletedAssemblies::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                (
                    "idx_completed_assemblies_completed_at",
                    CompletedAssemblies::CompletedAt,
                ),
                (
                    "idx_completed_assemblies_serial_number",
                    CompletedAssemblies::SerialNumber,
                ),
                (
                    "idx_completed_assemblies_barcode_number",
                    CompletedAssemblies::BarcodeNumber,
                ),
                (
                    "idx_completed_assemblies_work_order_ref",
                    CompletedAssemblies::WorkOrderRef,
                ),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(CompletedAssemblies::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CompletedAssemblies::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CompletedAssemblies {
        Table,
        Id,
        WorkOrderRef,
        AssemblyProcessId,
        Product,
        ItemCode,
        SerialNumber,
        BarcodeNumber,
        CompletedAt,
        CompletedBy,
        Zone,
        IsRework,
        Reworked,
        OriginalAssemblyId,
        ReworkNotes,
        ReworkedBy,
        ReworkedAt,
        ScannedComponents,
        ReworkedComponents,
        PreviousComponents,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000005_add_live_sensor_and_archive_version {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000005_add_live_sensor_and_archive_version"
        }
    }

    // Partial indexes are written by hand; both SQLite and Postgres accept this form.
    const CREATE_LIVE_SENSOR_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
        idx_scanned_parts_live_sensor ON scanned_parts (assembly_process_id, sensor_id) \
        WHERE replaced = false";
    const DROP_LIVE_SENSOR_INDEX: &str = "DROP INDEX IF EXISTS idx_scanned_parts_live_sensor";

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .get_connection()
                .execute_unprepared(CREATE_LIVE_SENSOR_INDEX)
                .await?;

            manager
                .alter_table(
                    Table::alter()
                        .table(CompletedAssemblies::Table)
                        .add_column(
                            ColumnDef::new(CompletedAssemblies::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .alter_table(
                    Table::alter()
                        .table(CompletedAssemblies::Table)
                        .drop_column(CompletedAssemblies::Version)
                        .to_owned(),
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared(DROP_LIVE_SENSOR_INDEX)
                .await?;
            Ok(())
        }
    }

    #[derive(Iden)]
    enum CompletedAssemblies {
        Table,
        Version,
    }
}
