use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dynamic value type for opaque attribute payloads.
///
/// Items and operations carry a free-form `BTreeMap<String, Value>`;
/// the server never interprets these beyond storing and echoing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// Attribute payload carried by items and operations.
pub type Attributes = BTreeMap<String, Value>;
