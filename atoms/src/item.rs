//! Helpers for reading and writing single-table DynamoDB items.
//!
//! Every entity shares the `PK`/`SK` key pair; the prefixes below are the only
//! place key shapes are spelled out.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

pub type Item = HashMap<String, AttributeValue>;

pub const TASK_PK: &str = "TASK";
pub const TASK_EXTERNAL_PK: &str = "TASK_EXTERNAL";
pub const USER_PK: &str = "USER";
pub const PENDING_USER_PK: &str = "PENDING_USER";
pub const DELIVERED_PK: &str = "DELIVERED";
pub const FILE_PK: &str = "FILE";
pub const NOTIFY_PK: &str = "NOTIFY";
pub const FINAL_REPORT_SK: &str = "FINAL_REPORT";

/// DynamoDB rejects any single item above 400 KB.
pub const MAX_ITEM_BYTES: usize = 400 * 1024;

pub fn task_sk(task_id: &str) -> String {
    format!("TASK#{}", task_id)
}

/// Partition holding a task's reviews and final report.
pub fn task_children_pk(task_id: &str) -> String {
    format!("TASK#{}", task_id)
}

pub fn external_sk(external_id: &str) -> String {
    format!("EXT#{}", external_id)
}

pub fn review_sk(review_id: &str) -> String {
    format!("REVIEW#{}", review_id)
}

pub fn user_sk(username: &str) -> String {
    format!("USER#{}", username)
}

pub fn delivered_sk(task_id: &str) -> String {
    format!("DELIVERED#{}", task_id)
}

/// Partition holding a delivered task's review and report snapshots.
pub fn delivered_children_pk(task_id: &str) -> String {
    format!("DELIVERED#{}", task_id)
}

pub fn file_sk(file_id: &str) -> String {
    format!("FILE#{}", file_id)
}

pub fn key(pk: impl Into<String>, sk: impl Into<String>) -> Item {
    let mut key = HashMap::new();
    key.insert("PK".to_string(), AttributeValue::S(pk.into()));
    key.insert("SK".to_string(), AttributeValue::S(sk.into()));
    key
}

/// Copy of `item` stored under another key.
pub fn rekey(item: &Item, pk: impl Into<String>, sk: impl Into<String>) -> Item {
    let mut copy = item.clone();
    copy.extend(key(pk, sk));
    copy
}

/// Approximate stored size: attribute names plus encoded values.
pub fn item_size(item: &Item) -> usize {
    item.iter().map(|(name, value)| name.len() + value_size(value)).sum()
}

fn value_size(value: &AttributeValue) -> usize {
    match value {
        AttributeValue::S(text) => text.len(),
        AttributeValue::N(number) => number.len(),
        AttributeValue::B(blob) => blob.as_ref().len(),
        AttributeValue::Ss(values) | AttributeValue::Ns(values) => values.iter().map(String::len).sum(),
        AttributeValue::L(values) => 3 + values.iter().map(|v| 1 + value_size(v)).sum::<usize>(),
        AttributeValue::M(map) => 3 + map.iter().map(|(k, v)| k.len() + 1 + value_size(v)).sum::<usize>(),
        _ => 1,
    }
}

pub fn get_s(item: &Item, name: &str) -> String {
    opt_s(item, name).unwrap_or_default()
}

pub fn opt_s(item: &Item, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

pub fn get_bool(item: &Item, name: &str) -> bool {
    item.get(name)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

pub fn get_n<T: std::str::FromStr + Default>(item: &Item, name: &str) -> T {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .unwrap_or_default()
}

pub fn get_string_list(item: &Item, name: &str) -> Vec<String> {
    item.get(name)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_s().ok().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Strip an SK prefix, e.g. `TASK#abc` -> `abc`.
pub fn sk_id(item: &Item, prefix: &str) -> Option<String> {
    item.get("SK")
        .and_then(|v| v.as_s().ok())
        .and_then(|sk| sk.strip_prefix(prefix))
        .map(|id| id.to_string())
}

pub fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

pub fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().cloned().map(AttributeValue::S).collect())
}

/// Insert only when present; absent optionals are never stored as empty strings.
pub fn put_opt(item: &mut Item, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        item.insert(name.to_string(), AttributeValue::S(value.clone()));
    }
}
