use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum HydraProject {
    Table,
    ProjectId,
    ProjectName,
    ProjectDescription,
    Status,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraNetwork {
    Table,
    NetworkId,
    ProjectId,
    NetworkName,
    NetworkDescription,
    NetworkLayout,
    Status,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraNode {
    Table,
    NodeId,
    NetworkId,
    NodeName,
    NodeDescription,
    NodeX,
    NodeY,
    Status,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraLink {
    Table,
    LinkId,
    NetworkId,
    Node1Id,
    Node2Id,
    LinkName,
    LinkDescription,
    Status,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraResourceGroup {
    Table,
    GroupId,
    NetworkId,
    GroupName,
    GroupDescription,
    Status,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraResourceGroupItem {
    Table,
    ItemId,
    GroupId,
    ScenarioId,
    RefKey,
    RefId,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraAttr {
    Table,
    AttrId,
    AttrName,
    AttrDimen,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraResourceAttr {
    Table,
    ResourceAttrId,
    AttrId,
    RefKey,
    NetworkId,
    NodeId,
    LinkId,
    GroupId,
    AttrIsVar,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraScenario {
    Table,
    ScenarioId,
    NetworkId,
    ScenarioName,
    ScenarioDescription,
    Status,
    StartTime,
    EndTime,
    TimeStep,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraResourceScenario {
    Table,
    ScenarioId,
    ResourceAttrId,
    DatasetId,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraDataset {
    Table,
    DatasetId,
    DataType,
    DataId,
    DataUnits,
    DataDimen,
    DataName,
    DataHash,
    Hidden,
    CrDate,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraMetadata {
    Table,
    DatasetId,
    MetadataName,
    MetadataVal,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraScalar {
    Table,
    DataId,
    ParamValue,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraDescriptor {
    Table,
    DataId,
    DescVal,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraArray {
    Table,
    DataId,
    ArrShape,
    ArrData,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraTimeseries {
    Table,
    DataId,
    TsShape,
    TsCount,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraTimeseriesData {
    Table,
    DataId,
    TsTime,
    TsValue,
}

#[derive(Iden, Clone, Copy)]
pub enum HydraEqTimeseries {
    Table,
    DataId,
    StartTime,
    Frequency,
    ArrShape,
    ArrData,
}

/// Renders an identifier the way the migration names it.
pub(crate) fn iden_name(iden: impl Iden) -> String {
    iden.to_string()
}
