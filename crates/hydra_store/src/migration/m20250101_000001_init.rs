use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(HydraProject::Table)
                    .if_not_exists()
                    .col(pk_col(HydraProject::ProjectId))
                    .col(ColumnDef::new(HydraProject::ProjectName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraProject::ProjectDescription).text())
                    .col(status_col(HydraProject::Status))
                    .col(cr_date_col(HydraProject::CrDate))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraNetwork::Table)
                    .if_not_exists()
                    .col(pk_col(HydraNetwork::NetworkId))
                    .col(ref_col(HydraNetwork::ProjectId, false))
                    .col(ColumnDef::new(HydraNetwork::NetworkName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraNetwork::NetworkDescription).text())
                    .col(ColumnDef::new(HydraNetwork::NetworkLayout).text())
                    .col(status_col(HydraNetwork::Status))
                    .col(cr_date_col(HydraNetwork::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_network_project")
                            .from(HydraNetwork::Table, HydraNetwork::ProjectId)
                            .to(HydraProject::Table, HydraProject::ProjectId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraNode::Table)
                    .if_not_exists()
                    .col(pk_col(HydraNode::NodeId))
                    .col(ref_col(HydraNode::NetworkId, false))
                    .col(ColumnDef::new(HydraNode::NodeName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraNode::NodeDescription).text())
                    .col(decimal_col(backend, HydraNode::NodeX))
                    .col(decimal_col(backend, HydraNode::NodeY))
                    .col(status_col(HydraNode::Status))
                    .col(cr_date_col(HydraNode::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_node_network")
                            .from(HydraNode::Table, HydraNode::NetworkId)
                            .to(HydraNetwork::Table, HydraNetwork::NetworkId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraLink::Table)
                    .if_not_exists()
                    .col(pk_col(HydraLink::LinkId))
                    .col(ref_col(HydraLink::NetworkId, false))
                    .col(ref_col(HydraLink::Node1Id, false))
                    .col(ref_col(HydraLink::Node2Id, false))
                    .col(ColumnDef::new(HydraLink::LinkName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraLink::LinkDescription).text())
                    .col(status_col(HydraLink::Status))
                    .col(cr_date_col(HydraLink::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_link_network")
                            .from(HydraLink::Table, HydraLink::NetworkId)
                            .to(HydraNetwork::Table, HydraNetwork::NetworkId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_link_node_1")
                            .from(HydraLink::Table, HydraLink::Node1Id)
                            .to(HydraNode::Table, HydraNode::NodeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_link_node_2")
                            .from(HydraLink::Table, HydraLink::Node2Id)
                            .to(HydraNode::Table, HydraNode::NodeId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraResourceGroup::Table)
                    .if_not_exists()
                    .col(pk_col(HydraResourceGroup::GroupId))
                    .col(ref_col(HydraResourceGroup::NetworkId, false))
                    .col(
                        ColumnDef::new(HydraResourceGroup::GroupName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(ColumnDef::new(HydraResourceGroup::GroupDescription).text())
                    .col(status_col(HydraResourceGroup::Status))
                    .col(cr_date_col(HydraResourceGroup::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_group_network")
                            .from(HydraResourceGroup::Table, HydraResourceGroup::NetworkId)
                            .to(HydraNetwork::Table, HydraNetwork::NetworkId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraScenario::Table)
                    .if_not_exists()
                    .col(pk_col(HydraScenario::ScenarioId))
                    .col(ref_col(HydraScenario::NetworkId, false))
                    .col(ColumnDef::new(HydraScenario::ScenarioName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraScenario::ScenarioDescription).text())
                    .col(status_col(HydraScenario::Status))
                    .col(ColumnDef::new(HydraScenario::StartTime).string_len(60))
                    .col(ColumnDef::new(HydraScenario::EndTime).string_len(60))
                    .col(ColumnDef::new(HydraScenario::TimeStep).string_len(60))
                    .col(cr_date_col(HydraScenario::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_scenario_network")
                            .from(HydraScenario::Table, HydraScenario::NetworkId)
                            .to(HydraNetwork::Table, HydraNetwork::NetworkId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraResourceGroupItem::Table)
                    .if_not_exists()
                    .col(pk_col(HydraResourceGroupItem::ItemId))
                    .col(ref_col(HydraResourceGroupItem::GroupId, false))
                    .col(ref_col(HydraResourceGroupItem::ScenarioId, false))
                    .col(
                        ColumnDef::new(HydraResourceGroupItem::RefKey)
                            .string_len(60)
                            .not_null(),
                    )
                    .col(ref_col(HydraResourceGroupItem::RefId, false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_group_item_group")
                            .from(HydraResourceGroupItem::Table, HydraResourceGroupItem::GroupId)
                            .to(HydraResourceGroup::Table, HydraResourceGroup::GroupId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_group_item_scenario")
                            .from(
                                HydraResourceGroupItem::Table,
                                HydraResourceGroupItem::ScenarioId,
                            )
                            .to(HydraScenario::Table, HydraScenario::ScenarioId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraAttr::Table)
                    .if_not_exists()
                    .col(pk_col(HydraAttr::AttrId))
                    .col(ColumnDef::new(HydraAttr::AttrName).string_len(200).not_null())
                    .col(ColumnDef::new(HydraAttr::AttrDimen).string_len(60))
                    .col(cr_date_col(HydraAttr::CrDate))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraResourceAttr::Table)
                    .if_not_exists()
                    .col(pk_col(HydraResourceAttr::ResourceAttrId))
                    .col(ref_col(HydraResourceAttr::AttrId, false))
                    .col(ColumnDef::new(HydraResourceAttr::RefKey).string_len(60).not_null())
                    .col(ref_col(HydraResourceAttr::NetworkId, true))
                    .col(ref_col(HydraResourceAttr::NodeId, true))
                    .col(ref_col(HydraResourceAttr::LinkId, true))
                    .col(ref_col(HydraResourceAttr::GroupId, true))
                    .col(
                        ColumnDef::new(HydraResourceAttr::AttrIsVar)
                            .string_len(1)
                            .not_null()
                            .default("N"),
                    )
                    .col(cr_date_col(HydraResourceAttr::CrDate))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_attr_attr")
                            .from(HydraResourceAttr::Table, HydraResourceAttr::AttrId)
                            .to(HydraAttr::Table, HydraAttr::AttrId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_attr_network")
                            .from(HydraResourceAttr::Table, HydraResourceAttr::NetworkId)
                            .to(HydraNetwork::Table, HydraNetwork::NetworkId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_attr_node")
                            .from(HydraResourceAttr::Table, HydraResourceAttr::NodeId)
                            .to(HydraNode::Table, HydraNode::NodeId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_attr_link")
                            .from(HydraResourceAttr::Table, HydraResourceAttr::LinkId)
                            .to(HydraLink::Table, HydraLink::LinkId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_attr_group")
                            .from(HydraResourceAttr::Table, HydraResourceAttr::GroupId)
                            .to(HydraResourceGroup::Table, HydraResourceGroup::GroupId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraDataset::Table)
                    .if_not_exists()
                    .col(pk_col(HydraDataset::DatasetId))
                    .col(ColumnDef::new(HydraDataset::DataType).string_len(60).not_null())
                    .col(ref_col(HydraDataset::DataId, false))
                    .col(ColumnDef::new(HydraDataset::DataUnits).string_len(60))
                    .col(ColumnDef::new(HydraDataset::DataDimen).string_len(60))
                    .col(ColumnDef::new(HydraDataset::DataName).string_len(200).not_null())
                    .col(
                        ColumnDef::new(HydraDataset::DataHash)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(HydraDataset::Hidden)
                            .string_len(1)
                            .not_null()
                            .default("N"),
                    )
                    .col(cr_date_col(HydraDataset::CrDate))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraResourceScenario::Table)
                    .if_not_exists()
                    .col(ref_col(HydraResourceScenario::ScenarioId, false))
                    .col(ref_col(HydraResourceScenario::ResourceAttrId, false))
                    .col(ref_col(HydraResourceScenario::DatasetId, false))
                    .primary_key(
                        Index::create()
                            .name("pk_hydra_resource_scenario")
                            .col(HydraResourceScenario::ScenarioId)
                            .col(HydraResourceScenario::ResourceAttrId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_scenario_scenario")
                            .from(HydraResourceScenario::Table, HydraResourceScenario::ScenarioId)
                            .to(HydraScenario::Table, HydraScenario::ScenarioId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_scenario_attr")
                            .from(
                                HydraResourceScenario::Table,
                                HydraResourceScenario::ResourceAttrId,
                            )
                            .to(HydraResourceAttr::Table, HydraResourceAttr::ResourceAttrId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_resource_scenario_dataset")
                            .from(HydraResourceScenario::Table, HydraResourceScenario::DatasetId)
                            .to(HydraDataset::Table, HydraDataset::DatasetId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraMetadata::Table)
                    .if_not_exists()
                    .col(ref_col(HydraMetadata::DatasetId, false))
                    .col(
                        ColumnDef::new(HydraMetadata::MetadataName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(ColumnDef::new(HydraMetadata::MetadataVal).text().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_hydra_metadata")
                            .col(HydraMetadata::DatasetId)
                            .col(HydraMetadata::MetadataName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_metadata_dataset")
                            .from(HydraMetadata::Table, HydraMetadata::DatasetId)
                            .to(HydraDataset::Table, HydraDataset::DatasetId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraScalar::Table)
                    .if_not_exists()
                    .col(pk_col(HydraScalar::DataId))
                    .col(decimal_col(backend, HydraScalar::ParamValue).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraDescriptor::Table)
                    .if_not_exists()
                    .col(pk_col(HydraDescriptor::DataId))
                    .col(ColumnDef::new(HydraDescriptor::DescVal).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraArray::Table)
                    .if_not_exists()
                    .col(pk_col(HydraArray::DataId))
                    .col(ColumnDef::new(HydraArray::ArrShape).text().not_null())
                    .col(ColumnDef::new(HydraArray::ArrData).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraTimeseries::Table)
                    .if_not_exists()
                    .col(pk_col(HydraTimeseries::DataId))
                    .col(ColumnDef::new(HydraTimeseries::TsShape).text().not_null())
                    .col(ColumnDef::new(HydraTimeseries::TsCount).integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraTimeseriesData::Table)
                    .if_not_exists()
                    .col(ref_col(HydraTimeseriesData::DataId, false))
                    .col(ColumnDef::new(HydraTimeseriesData::TsTime).string_len(60).not_null())
                    .col(ColumnDef::new(HydraTimeseriesData::TsValue).text().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_hydra_timeseries_data")
                            .col(HydraTimeseriesData::DataId)
                            .col(HydraTimeseriesData::TsTime),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_hydra_timeseries_data_timeseries")
                            .from(HydraTimeseriesData::Table, HydraTimeseriesData::DataId)
                            .to(HydraTimeseries::Table, HydraTimeseries::DataId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HydraEqTimeseries::Table)
                    .if_not_exists()
                    .col(pk_col(HydraEqTimeseries::DataId))
                    .col(ColumnDef::new(HydraEqTimeseries::StartTime).string_len(60).not_null())
                    .col(decimal_col(backend, HydraEqTimeseries::Frequency).not_null())
                    .col(ColumnDef::new(HydraEqTimeseries::ArrShape).text().not_null())
                    .col(ColumnDef::new(HydraEqTimeseries::ArrData).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_hydra_resource_scenario_dataset")
                    .table(HydraResourceScenario::Table)
                    .col(HydraResourceScenario::DatasetId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        drop_table(manager, HydraEqTimeseries::Table).await?;
        drop_table(manager, HydraTimeseriesData::Table).await?;
        drop_table(manager, HydraTimeseries::Table).await?;
        drop_table(manager, HydraArray::Table).await?;
        drop_table(manager, HydraDescriptor::Table).await?;
        drop_table(manager, HydraScalar::Table).await?;
        drop_table(manager, HydraMetadata::Table).await?;
        drop_table(manager, HydraResourceScenario::Table).await?;
        drop_table(manager, HydraDataset::Table).await?;
        drop_table(manager, HydraResourceAttr::Table).await?;
        drop_table(manager, HydraAttr::Table).await?;
        drop_table(manager, HydraResourceGroupItem::Table).await?;
        drop_table(manager, HydraScenario::Table).await?;
        drop_table(manager, HydraResourceGroup::Table).await?;
        drop_table(manager, HydraLink::Table).await?;
        drop_table(manager, HydraNode::Table).await?;
        drop_table(manager, HydraNetwork::Table).await?;
        drop_table(manager, HydraProject::Table).await?;
        Ok(())
    }
}

async fn drop_table(manager: &SchemaManager<'_>, table: impl Iden + 'static) -> Result<(), DbErr> {
    manager
        .drop_table(Table::drop().table(table).if_exists().to_owned())
        .await
}

fn pk_col(col: impl Iden + 'static) -> ColumnDef {
    ColumnDef::new(col)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn ref_col(col: impl Iden + 'static, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    col_def.integer();
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}

/// SQLite gets a TEXT-affinity column so decimal values survive exactly.
/// Postgres `numeric` is unconstrained; MySQL keeps the full 28-digit scale
/// of `rust_decimal`.
fn decimal_col(backend: DatabaseBackend, col: impl Iden + 'static) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Sqlite => {
            col_def.custom(Alias::new("decimal_text"));
        }
        DatabaseBackend::Postgres => {
            col_def.decimal();
        }
        _ => {
            col_def.decimal_len(65, 28);
        }
    }
    col_def.to_owned()
}

fn status_col(col: impl Iden + 'static) -> ColumnDef {
    ColumnDef::new(col)
        .string_len(1)
        .not_null()
        .default("A")
        .to_owned()
}

fn cr_date_col(col: impl Iden + 'static) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_ddl<T: SchemaBuilder>(backend: DatabaseBackend, builder: T) -> String {
        Table::create()
            .table(HydraScalar::Table)
            .col(decimal_col(backend, HydraScalar::ParamValue))
            .to_owned()
            .to_string(builder)
    }

    #[test]
    fn decimal_columns_do_not_round_fractions() {
        let postgres = scalar_ddl(DatabaseBackend::Postgres, PostgresQueryBuilder);
        assert!(postgres.contains("\"param_value\" decimal"), "{postgres}");
        assert!(!postgres.contains("decimal("), "{postgres}");

        let mysql = scalar_ddl(DatabaseBackend::MySql, MysqlQueryBuilder);
        assert!(mysql.contains("decimal(65, 28)"), "{mysql}");

        let sqlite = scalar_ddl(DatabaseBackend::Sqlite, SqliteQueryBuilder);
        assert!(sqlite.contains("decimal_text"), "{sqlite}");
    }
}
