use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    // string, array or object key
    Contains,
    // value is an optional bool, defaults to true
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// JSON pointer or dotted path into each item
    pub field: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct FilterConfig {
    /// where the array to filter sits in the input envelope, defaults to the primary input
    #[serde(default)]
    pub pointer: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
