use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use log::{debug, info};
use sea_orm::ConnectionTrait;
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use serde_json::Value as JsonValue;

use hydra_core::{
    ArrayValue, ContentHash, DataType, Dataset, DatasetCandidate, DatasetRef, DatasetValue,
    FieldValue, HydraError, HydraResult, ResourceAssignment, ResourceScenarioLink,
    TimeSeriesSample, canonical_decimal, canonical_timestamp, content_hash, parse_decimal,
};

use crate::bulk::{bulk_insert, insert_rows};
use crate::catalog::TableInfo;
use crate::config::LimitsConfig;
use crate::db::*;
use crate::entities::ResourceScenario;
use crate::record::Record;
use crate::schema::Schema;
use crate::sql::{bind_value, exec, ident, query_all, query_one, read_i64, read_string};

#[derive(Clone, Debug)]
pub struct DatasetStore {
    schema: Schema,
    limits: LimitsConfig,
}

struct NewDataset<'a> {
    candidate: &'a DatasetCandidate,
    hash: ContentHash,
    data_id: Option<i64>,
}

impl DatasetStore {
    pub fn new(schema: Schema, limits: LimitsConfig) -> Self {
        Self { schema, limits }
    }

    /// Stores each distinct candidate once and returns one reference per
    /// candidate, in input order. Nothing is written when any candidate is
    /// malformed.
    pub async fn bulk_insert_data<C: ConnectionTrait>(
        &self,
        conn: &C,
        candidates: &[DatasetCandidate],
    ) -> HydraResult<Vec<DatasetRef>> {
        for (index, candidate) in candidates.iter().enumerate() {
            candidate.validate(index)?;
        }
        let hashes: Vec<ContentHash> = candidates.iter().map(content_hash).collect();
        let mut known = self.find_by_hashes(conn, &hashes).await?;

        let mut seen = HashSet::new();
        let mut fresh: Vec<NewDataset<'_>> = candidates
            .iter()
            .zip(&hashes)
            .filter(|(_, hash)| !known.contains_key(*hash) && seen.insert((*hash).clone()))
            .map(|(candidate, hash)| NewDataset {
                candidate,
                hash: hash.clone(),
                data_id: None,
            })
            .collect();
        let created: HashSet<ContentHash> = fresh.iter().map(|item| item.hash.clone()).collect();

        if !fresh.is_empty() {
            for data_type in DataType::ALL {
                self.insert_payloads(conn, data_type, &mut fresh).await?;
            }
            let ids = self.insert_dataset_rows(conn, &fresh).await?;
            for (item, id) in fresh.iter().zip(&ids) {
                known.insert(item.hash.clone(), *id);
            }
            self.insert_metadata(conn, &fresh, &ids).await?;
        }
        info!(
            "dataset batch of {}: {} new, {} reused",
            candidates.len(),
            created.len(),
            candidates.len() - created.len()
        );

        hashes
            .into_iter()
            .map(|hash| {
                let dataset_id = *known.get(&hash).ok_or_else(|| {
                    HydraError::storage(format!("no dataset id resolved for {hash}"))
                })?;
                Ok(DatasetRef {
                    dataset_id,
                    created: created.contains(&hash),
                    content_hash: hash,
                })
            })
            .collect()
    }

    pub async fn find_by_hashes<C: ConnectionTrait>(
        &self,
        conn: &C,
        hashes: &[ContentHash],
    ) -> HydraResult<HashMap<ContentHash, i64>> {
        let mut unique: Vec<&str> = hashes.iter().map(ContentHash::as_str).collect();
        unique.sort_unstable();
        unique.dedup();
        let id_col = iden_name(HydraDataset::DatasetId);
        let hash_col = iden_name(HydraDataset::DataHash);
        let mut found = HashMap::new();
        for chunk in unique.chunks(self.limits.lookup_batch()) {
            let select = Query::select()
                .columns([HydraDataset::DatasetId, HydraDataset::DataHash])
                .from(HydraDataset::Table)
                .and_where(
                    Expr::col(HydraDataset::DataHash)
                        .is_in(chunk.iter().map(|hash| hash.to_string())),
                )
                .to_owned();
            for row in query_all(conn, &select).await? {
                let (Some(id), Some(hash)) = (read_i64(&row, &id_col)?, read_string(&row, &hash_col)?)
                else {
                    continue;
                };
                found.insert(ContentHash::from_hex(hash)?, id);
            }
        }
        debug!("{} of {} hashes already stored", found.len(), unique.len());
        Ok(found)
    }

    async fn insert_payloads<C: ConnectionTrait>(
        &self,
        conn: &C,
        data_type: DataType,
        fresh: &mut [NewDataset<'_>],
    ) -> HydraResult<()> {
        let positions: Vec<usize> = fresh
            .iter()
            .enumerate()
            .filter(|(_, item)| item.candidate.data_type() == data_type)
            .map(|(position, _)| position)
            .collect();
        if positions.is_empty() {
            return Ok(());
        }
        let (table, columns) = payload_layout(data_type);
        let rows = positions
            .iter()
            .map(|position| payload_row(&fresh[*position].candidate.value))
            .collect::<Vec<_>>();
        let ids = self.insert_chunked(conn, &table, &columns, rows).await?;
        if ids.len() != positions.len() {
            return Err(HydraError::storage(format!(
                "{table}: {} payload rows but {} ids",
                positions.len(),
                ids.len()
            )));
        }
        for (position, id) in positions.iter().zip(&ids) {
            fresh[*position].data_id = Some(*id);
        }
        if data_type == DataType::TimeSeries {
            let mut samples = Vec::new();
            for (position, data_id) in positions.iter().zip(&ids) {
                if let DatasetValue::TimeSeries(series) = &fresh[*position].candidate.value {
                    for sample in series {
                        samples.push(vec![
                            FieldValue::Int(*data_id),
                            FieldValue::Text(canonical_timestamp(&sample.timestamp)),
                            FieldValue::Text(values_json(&sample.value)),
                        ]);
                    }
                }
            }
            let table = iden_name(HydraTimeseriesData::Table);
            let columns = vec![
                iden_name(HydraTimeseriesData::DataId),
                iden_name(HydraTimeseriesData::TsTime),
                iden_name(HydraTimeseriesData::TsValue),
            ];
            self.insert_chunked(conn, &table, &columns, samples).await?;
        }
        Ok(())
    }

    async fn insert_dataset_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        fresh: &[NewDataset<'_>],
    ) -> HydraResult<Vec<i64>> {
        let table = iden_name(HydraDataset::Table);
        let columns = vec![
            iden_name(HydraDataset::DataType),
            iden_name(HydraDataset::DataId),
            iden_name(HydraDataset::DataUnits),
            iden_name(HydraDataset::DataDimen),
            iden_name(HydraDataset::DataName),
            iden_name(HydraDataset::DataHash),
        ];
        let rows = fresh
            .iter()
            .map(|item| {
                let data_id = item.data_id.ok_or_else(|| {
                    HydraError::storage(format!("no payload row written for {}", item.hash))
                })?;
                Ok(vec![
                    FieldValue::from(item.candidate.data_type().as_str()),
                    FieldValue::Int(data_id),
                    FieldValue::from(trimmed(item.candidate.unit.as_deref())),
                    FieldValue::from(trimmed(item.candidate.dimension.as_deref())),
                    FieldValue::from(item.candidate.name.as_str()),
                    FieldValue::from(item.hash.as_str()),
                ])
            })
            .collect::<HydraResult<Vec<_>>>()?;
        let ids = self.insert_chunked(conn, &table, &columns, rows).await?;
        if ids.len() != fresh.len() {
            return Err(HydraError::storage(format!(
                "{} datasets inserted but {} ids came back",
                fresh.len(),
                ids.len()
            )));
        }
        Ok(ids)
    }

    async fn insert_metadata<C: ConnectionTrait>(
        &self,
        conn: &C,
        fresh: &[NewDataset<'_>],
        ids: &[i64],
    ) -> HydraResult<()> {
        let rows: Vec<Vec<FieldValue>> = fresh
            .iter()
            .zip(ids)
            .flat_map(|(item, id)| {
                item.candidate.metadata.iter().map(move |(key, value)| {
                    vec![
                        FieldValue::Int(*id),
                        FieldValue::from(key.as_str()),
                        FieldValue::from(value.as_str()),
                    ]
                })
            })
            .collect();
        let table = iden_name(HydraMetadata::Table);
        let columns = vec![
            iden_name(HydraMetadata::DatasetId),
            iden_name(HydraMetadata::MetadataName),
            iden_name(HydraMetadata::MetadataVal),
        ];
        self.insert_chunked(conn, &table, &columns, rows).await?;
        Ok(())
    }

    async fn insert_chunked<C: ConnectionTrait>(
        &self,
        conn: &C,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<FieldValue>>,
    ) -> HydraResult<Vec<i64>> {
        let info = self.schema.catalog().require_table(table)?;
        let backend = conn.get_database_backend();
        let kinds = columns
            .iter()
            .map(|column| column_kind(&info, column))
            .collect::<HydraResult<Vec<_>>>()?;
        let mut ids = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(self.limits.insert_batch()) {
            let bound: Vec<Vec<_>> = chunk
                .iter()
                .map(|row| {
                    row.iter()
                        .zip(&kinds)
                        .map(|(value, kind)| bind_value(backend, *kind, value))
                        .collect::<Vec<_>>()
                })
                .collect();
            ids.extend(insert_rows(conn, &info, columns, bound).await?);
        }
        Ok(ids)
    }

    pub async fn load_dataset<C: ConnectionTrait>(
        &self,
        conn: &C,
        dataset_id: i64,
    ) -> HydraResult<Option<Dataset>> {
        let mut row = self.schema.record_for("dataset")?;
        row.set("dataset_id", dataset_id)?;
        if !row.load(conn).await? {
            return Ok(None);
        }
        let data_type = DataType::from_str(&text(&row, "data_type")?.unwrap_or_default())?;
        let data_id = int(&row, "data_id")?
            .ok_or_else(|| HydraError::storage(format!("dataset {dataset_id} has no data id")))?;
        let value = self.load_payload(conn, data_type, data_id).await?;

        let template = self.schema.record_for("metadata")?;
        let metadata = template
            .select_where(
                conn,
                &[("dataset_id".to_string(), FieldValue::Int(dataset_id))],
                &["metadata_name".to_string()],
            )
            .await?
            .iter()
            .map(|record| {
                Ok((
                    text(record, "metadata_name")?.unwrap_or_default(),
                    text(record, "metadata_val")?.unwrap_or_default(),
                ))
            })
            .collect::<HydraResult<BTreeMap<_, _>>>()?;

        Ok(Some(Dataset {
            id: Some(dataset_id),
            data_type,
            content_hash: ContentHash::from_hex(text(&row, "data_hash")?.unwrap_or_default())?,
            unit: text(&row, "data_units")?,
            dimension: text(&row, "data_dimen")?,
            name: text(&row, "data_name")?.unwrap_or_default(),
            metadata,
            value,
        }))
    }

    async fn load_payload<C: ConnectionTrait>(
        &self,
        conn: &C,
        data_type: DataType,
        data_id: i64,
    ) -> HydraResult<DatasetValue> {
        let entity = payload_entity(data_type);
        let mut payload = self.schema.record_for(entity)?;
        payload.set("data_id", data_id)?;
        if !payload.load(conn).await? {
            return Err(HydraError::integrity(format!(
                "{entity} payload {data_id} is missing"
            )));
        }
        Ok(match data_type {
            DataType::Scalar => DatasetValue::Scalar(
                payload
                    .get("param_value")?
                    .and_then(|value| value.as_decimal())
                    .ok_or_else(|| HydraError::storage(format!("scalar {data_id} is not a decimal")))?,
            ),
            DataType::Descriptor => {
                DatasetValue::Descriptor(text(&payload, "desc_val")?.unwrap_or_default())
            }
            DataType::Array => DatasetValue::Array(read_array(&payload, "arr_shape", "arr_data")?),
            DataType::EqTimeSeries => DatasetValue::EqTimeSeries {
                start_time: text(&payload, "start_time")?.unwrap_or_default(),
                frequency: payload
                    .get("frequency")?
                    .and_then(|value| value.as_decimal())
                    .ok_or_else(|| HydraError::storage(format!("frequency of {data_id} missing")))?,
                values: read_array(&payload, "arr_shape", "arr_data")?,
            },
            DataType::TimeSeries => {
                let shape = parse_shape(&text(&payload, "ts_shape")?.unwrap_or_default())?;
                let template = self.schema.record_for("timeseries_data")?;
                let samples = template
                    .select_where(
                        conn,
                        &[("data_id".to_string(), FieldValue::Int(data_id))],
                        &["ts_time".to_string()],
                    )
                    .await?
                    .iter()
                    .map(|record| {
                        Ok(TimeSeriesSample {
                            timestamp: text(record, "ts_time")?.unwrap_or_default(),
                            value: ArrayValue::new(
                                shape.clone(),
                                parse_values(&text(record, "ts_value")?.unwrap_or_default())?,
                            ),
                        })
                    })
                    .collect::<HydraResult<Vec<_>>>()?;
                DatasetValue::TimeSeries(samples)
            }
        })
    }

    /// Deletes a dataset and its payload unless a resource scenario still
    /// points at it. Returns whether it was deleted.
    pub async fn release_dataset<C: ConnectionTrait>(
        &self,
        conn: &C,
        dataset_id: i64,
    ) -> HydraResult<bool> {
        release_dataset_rows(conn, &self.schema, dataset_id).await
    }

    /// Stores the assigned values and binds each to its resource attribute
    /// in `scenario_id`, replacing earlier bindings.
    pub async fn attach_resource_scenarios<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: i64,
        assignments: &[ResourceAssignment],
    ) -> HydraResult<Vec<ResourceScenarioLink>> {
        let mut attrs = HashSet::new();
        for assignment in assignments {
            if !attrs.insert(assignment.resource_attr_id) {
                return Err(HydraError::validation(format!(
                    "resource attribute {} is assigned twice",
                    assignment.resource_attr_id
                )));
            }
        }
        if assignments.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<DatasetCandidate> = assignments
            .iter()
            .map(|assignment| assignment.candidate.clone())
            .collect();
        let refs = self.bulk_insert_data(conn, &candidates).await?;

        let clear = Query::delete()
            .from_table(HydraResourceScenario::Table)
            .and_where(Expr::col(HydraResourceScenario::ScenarioId).eq(scenario_id))
            .and_where(
                Expr::col(HydraResourceScenario::ResourceAttrId)
                    .is_in(assignments.iter().map(|a| a.resource_attr_id)),
            )
            .to_owned();
        exec(conn, &clear).await?;

        let mut links = Vec::with_capacity(assignments.len());
        let mut entities = Vec::with_capacity(assignments.len());
        for (assignment, dataset) in assignments.iter().zip(&refs) {
            let mut entity = ResourceScenario::new(&self.schema)?;
            entity.set_scenario_id(scenario_id)?;
            entity.set_resource_attr_id(assignment.resource_attr_id)?;
            entity.set_dataset_id(dataset.dataset_id)?;
            entities.push(entity.into_inner());
            links.push(ResourceScenarioLink {
                scenario_id,
                resource_attr_id: assignment.resource_attr_id,
                dataset_id: dataset.dataset_id,
            });
        }
        bulk_insert(conn, &mut entities, self.limits.insert_batch()).await?;
        Ok(links)
    }
}

pub(crate) async fn release_dataset_rows<C: ConnectionTrait>(
    conn: &C,
    schema: &Schema,
    dataset_id: i64,
) -> HydraResult<bool> {
    let in_use = Query::select()
        .column(HydraResourceScenario::ScenarioId)
        .from(HydraResourceScenario::Table)
        .and_where(Expr::col(HydraResourceScenario::DatasetId).eq(dataset_id))
        .limit(1)
        .to_owned();
    if query_one(conn, &in_use).await?.is_some() {
        debug!("dataset {dataset_id} is still referenced");
        return Ok(false);
    }
    let mut row = schema.record_for("dataset")?;
    row.set("dataset_id", dataset_id)?;
    if !row.load(conn).await? {
        return Err(HydraError::not_found(format!("dataset {dataset_id}")));
    }
    let data_type = DataType::from_str(&text(&row, "data_type")?.unwrap_or_default())?;
    let data_id = int(&row, "data_id")?;

    let metadata = Query::delete()
        .from_table(HydraMetadata::Table)
        .and_where(Expr::col(HydraMetadata::DatasetId).eq(dataset_id))
        .to_owned();
    exec(conn, &metadata).await?;
    row.delete(conn).await?;

    if let Some(data_id) = data_id {
        if data_type == DataType::TimeSeries {
            let samples = Query::delete()
                .from_table(HydraTimeseriesData::Table)
                .and_where(Expr::col(HydraTimeseriesData::DataId).eq(data_id))
                .to_owned();
            exec(conn, &samples).await?;
        }
        let (table, _) = payload_layout(data_type);
        let payload = Query::delete()
            .from_table(ident(&table))
            .and_where(Expr::col(ident("data_id")).eq(data_id))
            .to_owned();
        exec(conn, &payload).await?;
    }
    info!("released dataset {dataset_id}");
    Ok(true)
}

fn payload_entity(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Scalar => "scalar",
        DataType::Descriptor => "descriptor",
        DataType::Array => "array",
        DataType::TimeSeries => "timeseries",
        DataType::EqTimeSeries => "eq_timeseries",
    }
}

fn payload_layout(data_type: DataType) -> (String, Vec<String>) {
    match data_type {
        DataType::Scalar => (
            iden_name(HydraScalar::Table),
            vec![iden_name(HydraScalar::ParamValue)],
        ),
        DataType::Descriptor => (
            iden_name(HydraDescriptor::Table),
            vec![iden_name(HydraDescriptor::DescVal)],
        ),
        DataType::Array => (
            iden_name(HydraArray::Table),
            vec![iden_name(HydraArray::ArrShape), iden_name(HydraArray::ArrData)],
        ),
        DataType::TimeSeries => (
            iden_name(HydraTimeseries::Table),
            vec![
                iden_name(HydraTimeseries::TsShape),
                iden_name(HydraTimeseries::TsCount),
            ],
        ),
        DataType::EqTimeSeries => (
            iden_name(HydraEqTimeseries::Table),
            vec![
                iden_name(HydraEqTimeseries::StartTime),
                iden_name(HydraEqTimeseries::Frequency),
                iden_name(HydraEqTimeseries::ArrShape),
                iden_name(HydraEqTimeseries::ArrData),
            ],
        ),
    }
}

fn payload_row(value: &DatasetValue) -> Vec<FieldValue> {
    match value {
        DatasetValue::Scalar(value) => vec![FieldValue::Decimal(*value)],
        DatasetValue::Descriptor(text) => vec![FieldValue::from(text.as_str())],
        DatasetValue::Array(array) => vec![
            FieldValue::Text(shape_json(&array.shape)),
            FieldValue::Text(values_json(array)),
        ],
        DatasetValue::TimeSeries(samples) => vec![
            FieldValue::Text(shape_json(
                samples
                    .first()
                    .map(|sample| sample.value.shape.as_slice())
                    .unwrap_or(&[]),
            )),
            FieldValue::Int(samples.len() as i64),
        ],
        DatasetValue::EqTimeSeries {
            start_time,
            frequency,
            values,
        } => vec![
            FieldValue::Text(canonical_timestamp(start_time)),
            FieldValue::Decimal(*frequency),
            FieldValue::Text(shape_json(&values.shape)),
            FieldValue::Text(values_json(values)),
        ],
    }
}

fn shape_json(shape: &[usize]) -> String {
    JsonValue::from(shape.to_vec()).to_string()
}

fn values_json(array: &ArrayValue) -> String {
    JsonValue::from(
        array
            .values
            .iter()
            .map(|value| canonical_decimal(*value))
            .collect::<Vec<_>>(),
    )
    .to_string()
}

fn parse_shape(raw: &str) -> HydraResult<Vec<usize>> {
    serde_json::from_str(raw).map_err(|err| HydraError::storage(format!("array shape: {err}")))
}

fn parse_values(raw: &str) -> HydraResult<Vec<rust_decimal::Decimal>> {
    let items: Vec<String> = serde_json::from_str(raw)
        .map_err(|err| HydraError::storage(format!("array values: {err}")))?;
    items
        .iter()
        .map(|item| {
            parse_decimal(item)
                .ok_or_else(|| HydraError::storage(format!("'{item}' is not a decimal")))
        })
        .collect()
}

fn read_array(record: &Record, shape_col: &str, data_col: &str) -> HydraResult<ArrayValue> {
    Ok(ArrayValue::new(
        parse_shape(&text(record, shape_col)?.unwrap_or_default())?,
        parse_values(&text(record, data_col)?.unwrap_or_default())?,
    ))
}

fn text(record: &Record, column: &str) -> HydraResult<Option<String>> {
    Ok(record.get(column)?.map(|value| match value {
        FieldValue::Text(text) => text,
        FieldValue::Json(json) => json.to_string(),
        other => format!("{other:?}"),
    }))
}

fn int(record: &Record, column: &str) -> HydraResult<Option<i64>> {
    Ok(record.get(column)?.and_then(|value| value.as_i64()))
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn column_kind(table: &TableInfo, column: &str) -> HydraResult<hydra_core::TypeKind> {
    table
        .column(column)
        .map(|info| info.kind)
        .ok_or_else(|| HydraError::schema(format!("'{}' has no column '{column}'", table.name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_payload_is_stored_as_exact_text() {
        let array = ArrayValue::new(
            vec![2],
            vec![
                rust_decimal::Decimal::from_str("1.10").unwrap(),
                rust_decimal::Decimal::from_str("-0.000").unwrap(),
            ],
        );
        assert_eq!(shape_json(&array.shape), "[2]");
        assert_eq!(values_json(&array), r#"["1.1","0"]"#);
        assert_eq!(parse_values(&values_json(&array)).unwrap().len(), 2);
    }

    #[test]
    fn every_type_has_a_payload_table() {
        for data_type in DataType::ALL {
            let (table, columns) = payload_layout(data_type);
            assert!(table.starts_with("hydra_"));
            let row = match data_type {
                DataType::Scalar => payload_row(&DatasetValue::Scalar(Default::default())),
                DataType::Descriptor => payload_row(&DatasetValue::Descriptor("x".into())),
                DataType::Array => payload_row(&DatasetValue::Array(ArrayValue::vector(vec![]))),
                DataType::TimeSeries => payload_row(&DatasetValue::TimeSeries(vec![])),
                DataType::EqTimeSeries => payload_row(&DatasetValue::EqTimeSeries {
                    start_time: "2024-01-01".into(),
                    frequency: rust_decimal::Decimal::ONE,
                    values: ArrayValue::vector(vec![]),
                }),
            };
            assert_eq!(row.len(), columns.len());
        }
    }

    #[test]
    fn blank_units_are_dropped() {
        assert_eq!(trimmed(Some("  ")), None);
        assert_eq!(trimmed(Some(" m ")), Some("m".to_string()));
    }
}
