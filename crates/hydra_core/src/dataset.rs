use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::hash::ContentHash;
use crate::time::canonical_timestamp;
use crate::value::parse_decimal;
use crate::{HydraError, HydraResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Scalar,
    Descriptor,
    Array,
    #[serde(rename = "timeseries")]
    TimeSeries,
    #[serde(rename = "eqtimeseries")]
    EqTimeSeries,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Scalar,
        DataType::Descriptor,
        DataType::Array,
        DataType::TimeSeries,
        DataType::EqTimeSeries,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Scalar => "scalar",
            DataType::Descriptor => "descriptor",
            DataType::Array => "array",
            DataType::TimeSeries => "timeseries",
            DataType::EqTimeSeries => "eqtimeseries",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = HydraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|data_type| data_type.as_str() == value)
            .ok_or_else(|| HydraError::validation(format!("unknown data type '{value}'")))
    }
}

/// An n-dimensional numeric array stored row-major.
///
/// Invariant (checked by [`ArrayValue::check_shape`], not by construction):
/// `values.len()` equals the product of `shape`; an empty shape holds one value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub shape: Vec<usize>,
    pub values: Vec<Decimal>,
}

impl ArrayValue {
    pub fn new(shape: Vec<usize>, values: Vec<Decimal>) -> Self {
        Self { shape, values }
    }

    pub fn vector(values: Vec<Decimal>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn single(value: Decimal) -> Self {
        Self {
            shape: Vec::new(),
            values: vec![value],
        }
    }

    /// Reads a nested JSON array such as `[[1, 2], [3, 4]]`. Ragged
    /// nesting and non-numeric leaves are rejected.
    pub fn from_json(value: &JsonValue) -> HydraResult<Self> {
        let mut shape = Vec::new();
        let mut level = value;
        while let JsonValue::Array(items) = level {
            shape.push(items.len());
            match items.first() {
                Some(first) => level = first,
                None => break,
            }
        }
        let mut values = Vec::new();
        flatten_json(value, &shape, 0, &mut values)?;
        Ok(Self { shape, values })
    }

    pub fn to_json(&self) -> JsonValue {
        fn build(shape: &[usize], values: &mut std::slice::Iter<'_, Decimal>) -> JsonValue {
            match shape.split_first() {
                None => values
                    .next()
                    .map(|value| decimal_to_json(*value))
                    .unwrap_or(JsonValue::Null),
                Some((len, rest)) => {
                    JsonValue::Array((0..*len).map(|_| build(rest, values)).collect())
                }
            }
        }
        build(&self.shape, &mut self.values.iter())
    }

    pub fn expected_len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn check_shape(&self) -> Result<(), String> {
        let expected = self.expected_len();
        if expected != self.values.len() {
            return Err(format!(
                "shape {:?} expects {expected} values, found {}",
                self.shape,
                self.values.len()
            ));
        }
        Ok(())
    }
}

fn flatten_json(
    value: &JsonValue,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<Decimal>,
) -> HydraResult<()> {
    match value {
        JsonValue::Array(items) => {
            if shape.get(depth) != Some(&items.len()) {
                return Err(HydraError::validation("array is ragged"));
            }
            for item in items {
                flatten_json(item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        JsonValue::Number(number) if depth == shape.len() => {
            let decimal = parse_decimal(&number.to_string())
                .ok_or_else(|| HydraError::validation(format!("'{number}' is not a decimal")))?;
            out.push(decimal);
            Ok(())
        }
        JsonValue::String(text) if depth == shape.len() => {
            let decimal = parse_decimal(text)
                .ok_or_else(|| HydraError::validation(format!("'{text}' is not a decimal")))?;
            out.push(decimal);
            Ok(())
        }
        _ => Err(HydraError::validation("array is ragged or holds non-numeric values")),
    }
}

fn decimal_to_json(value: Decimal) -> JsonValue {
    serde_json::from_str(&value.normalize().to_string())
        .unwrap_or_else(|_| JsonValue::String(value.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesSample {
    pub timestamp: String,
    pub value: ArrayValue,
}

impl TimeSeriesSample {
    pub fn new(timestamp: impl Into<String>, value: ArrayValue) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DatasetValue {
    Scalar(Decimal),
    Descriptor(String),
    Array(ArrayValue),
    #[serde(rename = "timeseries")]
    TimeSeries(Vec<TimeSeriesSample>),
    #[serde(rename = "eqtimeseries")]
    EqTimeSeries {
        start_time: String,
        frequency: Decimal,
        values: ArrayValue,
    },
}

impl DatasetValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DatasetValue::Scalar(_) => DataType::Scalar,
            DatasetValue::Descriptor(_) => DataType::Descriptor,
            DatasetValue::Array(_) => DataType::Array,
            DatasetValue::TimeSeries(_) => DataType::TimeSeries,
            DatasetValue::EqTimeSeries { .. } => DataType::EqTimeSeries,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetCandidate {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub dimension: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub value: DatasetValue,
}

impl DatasetCandidate {
    pub fn new(name: impl Into<String>, value: DatasetValue) -> Self {
        Self {
            name: name.into(),
            unit: None,
            dimension: None,
            metadata: BTreeMap::new(),
            value,
        }
    }

    pub fn scalar(name: impl Into<String>, value: Decimal) -> Self {
        Self::new(name, DatasetValue::Scalar(value))
    }

    pub fn descriptor(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, DatasetValue::Descriptor(value.into()))
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    /// Rejects malformed payloads; `index` is the candidate's position in
    /// its batch and is carried by the error.
    pub fn validate(&self, index: usize) -> HydraResult<()> {
        match &self.value {
            DatasetValue::Scalar(_) | DatasetValue::Descriptor(_) => Ok(()),
            DatasetValue::Array(array) => array
                .check_shape()
                .map_err(|message| HydraError::payload_shape(index, message)),
            DatasetValue::TimeSeries(samples) => {
                let Some(first) = samples.first() else {
                    return Err(HydraError::payload_shape(index, "timeseries has no samples"));
                };
                let mut seen = HashSet::with_capacity(samples.len());
                for sample in samples {
                    sample
                        .value
                        .check_shape()
                        .map_err(|message| HydraError::payload_shape(index, message))?;
                    if sample.value.shape != first.value.shape {
                        return Err(HydraError::payload_shape(
                            index,
                            format!(
                                "sample at '{}' has shape {:?}, expected {:?}",
                                sample.timestamp, sample.value.shape, first.value.shape
                            ),
                        ));
                    }
                    let canonical = canonical_timestamp(&sample.timestamp);
                    if !seen.insert(canonical.clone()) {
                        return Err(HydraError::duplicate_timestamp(index, canonical));
                    }
                }
                Ok(())
            }
            DatasetValue::EqTimeSeries {
                frequency, values, ..
            } => {
                if *frequency <= Decimal::ZERO {
                    return Err(HydraError::payload_shape(
                        index,
                        "equally spaced timeseries needs a positive frequency",
                    ));
                }
                values
                    .check_shape()
                    .map_err(|message| HydraError::payload_shape(index, message))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset_id: i64,
    pub content_hash: ContentHash,
    /// `true` when the dataset row did not exist before the call.
    pub created: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Option<i64>,
    pub data_type: DataType,
    pub content_hash: ContentHash,
    pub unit: Option<String>,
    pub dimension: Option<String>,
    pub name: String,
    pub metadata: BTreeMap<String, String>,
    pub value: DatasetValue,
}

impl Dataset {
    pub fn to_candidate(&self) -> DatasetCandidate {
        DatasetCandidate {
            name: self.name.clone(),
            unit: self.unit.clone(),
            dimension: self.dimension.clone(),
            metadata: self.metadata.clone(),
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    #[test]
    fn nested_json_arrays_flatten_row_major() {
        let array = ArrayValue::from_json(&json!([[1, 2, 3], [4, 5, 6]])).unwrap();
        assert_eq!(array.shape, vec![2, 3]);
        assert_eq!(array.values.len(), 6);
        assert_eq!(array.values[3], dec("4"));
        assert_eq!(array.to_json(), json!([[1, 2, 3], [4, 5, 6]]));
    }

    #[test]
    fn ragged_arrays_are_rejected() {
        assert!(ArrayValue::from_json(&json!([[1, 2], [3]])).is_err());
        assert!(ArrayValue::from_json(&json!([1, "x"])).is_err());
    }

    #[test]
    fn shape_mismatch_reports_candidate_index() {
        let candidate = DatasetCandidate::new(
            "flows",
            DatasetValue::Array(ArrayValue::new(vec![2, 2], vec![dec("1"); 3])),
        );
        let err = candidate.validate(7).unwrap_err();
        assert!(matches!(err, HydraError::PayloadShape { index: 7, .. }));
    }

    #[test]
    fn duplicate_timestamps_are_rejected_after_normalisation() {
        let candidate = DatasetCandidate::new(
            "demand",
            DatasetValue::TimeSeries(vec![
                TimeSeriesSample::new("2024-01-01T00:00:00Z", ArrayValue::single(dec("1"))),
                TimeSeriesSample::new("2024-01-01 00:00:00", ArrayValue::single(dec("2"))),
            ]),
        );
        let err = candidate.validate(0).unwrap_err();
        assert!(matches!(err, HydraError::DuplicateTimestamp { index: 0, .. }));
    }

    #[test]
    fn mixed_sample_shapes_are_rejected() {
        let candidate = DatasetCandidate::new(
            "demand",
            DatasetValue::TimeSeries(vec![
                TimeSeriesSample::new("2024-01-01", ArrayValue::single(dec("1"))),
                TimeSeriesSample::new("2024-01-02", ArrayValue::vector(vec![dec("1"), dec("2")])),
            ]),
        );
        assert!(matches!(
            candidate.validate(2),
            Err(HydraError::PayloadShape { index: 2, .. })
        ));
    }

    #[test]
    fn eq_timeseries_requires_positive_frequency() {
        let candidate = DatasetCandidate::new(
            "inflow",
            DatasetValue::EqTimeSeries {
                start_time: "2024-01-01".to_string(),
                frequency: Decimal::ZERO,
                values: ArrayValue::vector(vec![dec("1")]),
            },
        );
        assert!(candidate.validate(0).is_err());
    }

    #[test]
    fn data_type_names_roundtrip() {
        for data_type in DataType::ALL {
            assert_eq!(DataType::from_str(data_type.as_str()).unwrap(), data_type);
        }
        assert!(DataType::from_str("matrix").is_err());
    }

    #[test]
    fn candidates_deserialize_from_tagged_json() {
        let candidate: DatasetCandidate = serde_json::from_value(json!({
            "name": "capacity",
            "unit": "m^3",
            "value": { "type": "scalar", "value": "1.01" }
        }))
        .unwrap();
        assert_eq!(candidate.value, DatasetValue::Scalar(dec("1.01")));
        assert!(candidate.metadata.is_empty());
    }
}
