use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use unicode_normalization::UnicodeNormalization;

use crate::dataset::{ArrayValue, DatasetCandidate, DatasetValue, TimeSeriesSample};
use crate::time::canonical_timestamp;
use crate::{HydraError, HydraResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_hex(value: impl Into<String>) -> HydraResult<Self> {
        let value = value.into();
        if value.len() != Self::HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HydraError::validation(format!(
                "'{value}' is not a content hash"
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes the canonical form of a candidate.
///
/// The display name is not part of the content: two candidates that differ
/// only by name resolve to the same dataset.
pub fn content_hash(candidate: &DatasetCandidate) -> ContentHash {
    let canonical = canonical_json(candidate);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    ContentHash(blake3::hash(&bytes).to_hex().to_string())
}

/// The JSON document that is hashed. Object keys serialize in sorted order
/// (`serde_json::Map` without `preserve_order`).
pub fn canonical_json(candidate: &DatasetCandidate) -> JsonValue {
    let mut metadata = Map::new();
    for (key, value) in &candidate.metadata {
        metadata.insert(nfc(key), JsonValue::String(nfc(value)));
    }
    json!({
        "type": candidate.data_type().as_str(),
        "unit": optional_text(candidate.unit.as_deref()),
        "dimension": optional_text(candidate.dimension.as_deref()),
        "metadata": JsonValue::Object(metadata),
        "value": canonical_value(&candidate.value),
    })
}

fn canonical_value(value: &DatasetValue) -> JsonValue {
    match value {
        DatasetValue::Scalar(value) => JsonValue::String(canonical_decimal(*value)),
        DatasetValue::Descriptor(text) => JsonValue::String(nfc(text)),
        DatasetValue::Array(array) => canonical_array(array),
        DatasetValue::TimeSeries(samples) => {
            let mut sorted: Vec<(String, &TimeSeriesSample)> = samples
                .iter()
                .map(|sample| (canonical_timestamp(&sample.timestamp), sample))
                .collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            JsonValue::Array(
                sorted
                    .into_iter()
                    .map(|(timestamp, sample)| json!([timestamp, canonical_array(&sample.value)]))
                    .collect(),
            )
        }
        DatasetValue::EqTimeSeries {
            start_time,
            frequency,
            values,
        } => json!({
            "start": canonical_timestamp(start_time),
            "frequency": canonical_decimal(*frequency),
            "values": canonical_array(values),
        }),
    }
}

fn canonical_array(array: &ArrayValue) -> JsonValue {
    json!({
        "shape": array.shape,
        "values": array.values.iter().map(|v| canonical_decimal(*v)).collect::<Vec<_>>(),
    })
}

/// `1.0`, `1.00` and `1` share one spelling; negative zero collapses to `0`.
pub fn canonical_decimal(value: Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    value.normalize().to_string()
}

fn optional_text(value: Option<&str>) -> JsonValue {
    match value.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => JsonValue::String(nfc(text)),
        None => JsonValue::Null,
    }
}

fn nfc(text: &str) -> String {
    text.nfc().collect()
}
