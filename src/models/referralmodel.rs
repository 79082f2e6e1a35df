use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::utils::{currency::parse_amount, date};

pub const UNKNOWN_NAME: &str = "Unknown";
pub const NOT_AVAILABLE: &str = "N/A";

/// Identifier of a downline member. Upstream sends both numeric and string ids,
/// so both are kept in their textual form. Integral floats (`1.0`) read as their
/// integer form so they still match a sponsor id of `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReferralId(pub String);

impl ReferralId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(number_id(n))),
            _ => None,
        }
    }
}

fn number_id(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }

    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

impl fmt::Display for ReferralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReferralId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for ReferralId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A date as it arrives from upstream: a locale string (`15/03/2024`), an ISO
/// string, epoch milliseconds, or a value that was already parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Text(String),
    Millis(i64),
    Parsed(NaiveDateTime),
}

impl DateInput {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(Self::Millis),
            _ => None,
        }
    }

    pub fn normalize(&self) -> Option<NaiveDateTime> {
        date::normalize(self)
    }
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl Serialize for DateInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DateInput::Text(text) => serializer.serialize_str(text),
            DateInput::Millis(ms) => serializer.serialize_i64(*ms),
            DateInput::Parsed(at) => {
                serializer.serialize_str(&at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            }
        }
    }
}

/// One downline member inside a generation bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ReferralId>,
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub sponsor_id: Option<ReferralId>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub pack_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<DateInput>,
    #[serde(default, deserialize_with = "lenient_date", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateInput>,
    #[serde(default, deserialize_with = "lenient_amount", skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount", skip_serializing_if = "Option::is_none")]
    pub total_commission: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

impl ReferralRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    /// `packStatus` takes precedence over the generic `status` field.
    pub fn effective_status(&self) -> Option<&str> {
        self.pack_status.as_deref().or(self.status.as_deref())
    }

    pub fn commission_amount(&self) -> f64 {
        self.commission.or(self.total_commission).unwrap_or(0.0)
    }

    pub fn referral_code_or_default(&self) -> &str {
        self.referral_code.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn purchased_at(&self) -> Option<NaiveDateTime> {
        self.purchase_date.as_ref().and_then(DateInput::normalize)
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ReferralId>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(ReferralId::from_value(&value))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_amount(&s),
        _ => None,
    })
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateInput>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(DateInput::from_value(&value))
}

/// Referral buckets for one `(user, pack)` pair as returned by upstream.
/// Bucket `i` holds the generation `i + 1` records.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum GenerationStore {
    /// Anything that is not an array.
    #[default]
    Malformed,
    /// A single flat list of records, treated as generation 1.
    Flat(Vec<ReferralRecord>),
    Nested(Vec<Vec<ReferralRecord>>),
}

impl GenerationStore {
    pub fn from_value(value: Value) -> Self {
        let Value::Array(items) = value else {
            tracing::warn!("Generation store is not an array, treating it as empty");
            return GenerationStore::Malformed;
        };

        if items.is_empty() {
            return GenerationStore::Nested(Vec::new());
        }

        let nested = items.iter().any(Value::is_array);
        if !nested {
            return GenerationStore::Flat(parse_bucket(items, 1));
        }

        let buckets = items
            .into_iter()
            .enumerate()
            .map(|(offset, bucket)| match bucket {
                Value::Array(records) => parse_bucket(records, offset + 1),
                _ => {
                    tracing::warn!("Generation {} is not a list, treating it as empty", offset + 1);
                    Vec::new()
                }
            })
            .collect();

        GenerationStore::Nested(buckets)
    }

    /// Number of generation tabs available.
    pub fn generation_count(&self) -> usize {
        match self {
            GenerationStore::Malformed => 0,
            GenerationStore::Flat(_) => 1,
            GenerationStore::Nested(buckets) => buckets.len(),
        }
    }

    /// Records of a 1-based generation. Out-of-range generations and malformed
    /// stores yield an empty slice.
    pub fn bucket(&self, generation: usize) -> &[ReferralRecord] {
        match (self, generation) {
            (GenerationStore::Flat(records), 1) => records,
            (GenerationStore::Nested(buckets), g) if g >= 1 => {
                buckets.get(g - 1).map(Vec::as_slice).unwrap_or(&[])
            }
            _ => &[],
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            GenerationStore::Malformed => 0,
            GenerationStore::Flat(records) => records.len(),
            GenerationStore::Nested(buckets) => buckets.iter().map(Vec::len).sum(),
        }
    }
}

fn parse_bucket(items: Vec<Value>, generation: usize) -> Vec<ReferralRecord> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ReferralRecord>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping unreadable referral in generation {}: {}", generation, e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttributes {
    pub generation: u32,
    pub commission: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub user_id: Option<ReferralId>,
    pub sponsor_id: Option<ReferralId>,
}

/// Node of the downline tree in the `{name, attributes, children}` shape the
/// tree renderer consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownlineNode {
    pub name: String,
    pub attributes: NodeAttributes,
    pub children: Vec<DownlineNode>,
}

impl DownlineNode {
    /// Nodes in this subtree, including `self`.
    pub fn count_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}
