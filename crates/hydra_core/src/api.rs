use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Dataset, DatasetCandidate, DatasetRef, HydraResult};

/// A value to attach to one resource attribute within a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceAssignment {
    pub resource_attr_id: i64,
    pub candidate: DatasetCandidate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScenarioLink {
    pub scenario_id: i64,
    pub resource_attr_id: i64,
    pub dataset_id: i64,
}

#[async_trait]
pub trait DatasetApi {
    /// Stores every candidate not already present and returns one reference
    /// per candidate, in input order.
    async fn bulk_insert_data(&self, candidates: Vec<DatasetCandidate>)
    -> HydraResult<Vec<DatasetRef>>;

    async fn get_dataset(&self, dataset_id: i64) -> HydraResult<Option<Dataset>>;

    /// Deletes the dataset unless a resource scenario still references it.
    async fn release_dataset(&self, dataset_id: i64) -> HydraResult<bool>;

    async fn attach_resource_scenarios(
        &self,
        scenario_id: i64,
        assignments: Vec<ResourceAssignment>,
    ) -> HydraResult<Vec<ResourceScenarioLink>>;
}
