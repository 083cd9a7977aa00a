use anyhow::{bail, Result};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use sos_core::{Dictionary, PeerEngine, PeerInfo, Value};

/// Converts a JSON object into a gestalt dictionary. JSON has no byte or
/// date type, so only strings, integers, booleans, arrays and objects are
/// accepted.
pub fn dictionary_from_json(object: &JsonMap<String, JsonValue>) -> Result<Dictionary> {
    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), value_from_json(key, value)?)))
        .collect()
}

fn value_from_json(path: &str, value: &JsonValue) -> Result<Value> {
    Ok(match value {
        JsonValue::String(text) => Value::String(text.clone()),
        JsonValue::Bool(flag) => Value::Bool(*flag),
        JsonValue::Number(number) => match number.as_i64() {
            Some(integer) => Value::Integer(integer),
            None => bail!("`{path}` must be an integer, found {number}"),
        },
        JsonValue::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| value_from_json(&format!("{path}[{index}]"), item))
                .collect::<Result<_>>()?,
        ),
        JsonValue::Object(object) => Value::dictionary(
            object
                .iter()
                .map(|(key, item)| Ok((key.clone(), value_from_json(&format!("{path}.{key}"), item)?)))
                .collect::<Result<Dictionary>>()?,
        ),
        JsonValue::Null => bail!("`{path}` is null; omit the key instead"),
    })
}

/// Bytes render as hex and dates in their fixed text form.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::String(text) => JsonValue::String(text.clone()),
        Value::Integer(integer) => json!(integer),
        Value::Bool(flag) => JsonValue::Bool(*flag),
        Value::Bytes(bytes) => JsonValue::String(hex::encode(bytes)),
        Value::Date(date) => JsonValue::String(date.to_string()),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Dictionary(map) => dictionary_to_json(map),
    }
}

pub fn dictionary_to_json(map: &Dictionary) -> JsonValue {
    JsonValue::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

/// Summary printed by `sos show`.
pub fn record_summary(engine: &PeerEngine, record: &PeerInfo) -> JsonValue {
    json!({
        "peer_id": record.id().as_str(),
        "version": record.version(),
        "public_key": record.public_key().ok().map(|key| hex::encode(key.as_bytes())),
        "signature": hex::encode(record.signature()),
        "verified": engine.verify(record),
        "gestalt": dictionary_to_json(record.gestalt()),
        "v2": record.v2_dictionary().map(dictionary_to_json),
        "transport_type": record.transport_type(),
        "views": record.views().collect::<Vec<_>>(),
        "security_properties": record.security_properties().collect::<Vec<_>>(),
        "applicant": record.is_applicant(),
        "application_date": record.application_date().map(|date| date.to_string()),
        "retirement_date": record.retirement_date().map(|date| date.to_string()),
    })
}
