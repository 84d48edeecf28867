//! Adapter for the loosely-specified reply payloads.
//!
//! Deployments disagree on both the envelope (bare array or `{replies: [...]}`)
//! and the field names. Each field is looked up in priority order; the first
//! non-empty string wins.

use serde_json::{Map, Value};
use tracing::debug;

use piramide_types::models::{
    ANONYMOUS_ALIAS, ClassTag, ItemId, PostId, Reply, parse_timestamp,
};

pub const ALIAS_KEYS: &[&str] = &["alias", "user", "nome"];
pub const TEXT_KEYS: &[&str] = &["texto", "message", "msg", "reply_text"];
pub const CLASS_KEYS: &[&str] = &["classe", "class"];
pub const ID_KEYS: &[&str] = &["id", "reply_id"];
pub const TIMESTAMP_KEYS: &[&str] = &["created_at", "timestamp"];

/// Any payload shape other than the two known envelopes yields an empty list.
pub fn normalize_replies(payload: &Value, post_id: &PostId) -> Vec<Reply> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("replies") {
            Some(Value::Array(items)) => items,
            _ => {
                debug!("Replies payload for post {} has no list, treating as empty", post_id);
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| normalize_reply(item, post_id))
        .collect()
}

/// `None` for non-object entries.
pub fn normalize_reply(value: &Value, post_id: &PostId) -> Option<Reply> {
    let obj = value.as_object()?;

    Some(Reply {
        id: ID_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(ItemId::from_value)),
        post_id: post_id.clone(),
        alias: first_string(obj, ALIAS_KEYS).unwrap_or_else(|| ANONYMOUS_ALIAS.to_string()),
        text: first_string(obj, TEXT_KEYS).unwrap_or_default(),
        class_tag: first_string(obj, CLASS_KEYS).and_then(|c| c.parse::<ClassTag>().ok()),
        created_at: TIMESTAMP_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(parse_timestamp)),
    })
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    })
}
