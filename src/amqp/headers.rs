use lapin::types::{AMQPValue, ByteArray, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

use crate::engine::{Header, Payload};

/// Collapses an ordered header list into a map; a repeated key keeps its
/// last value.
pub fn convert_headers(headers: &[Header]) -> BTreeMap<String, Option<Payload>> {
    let mut converted = BTreeMap::new();
    for header in headers {
        converted.insert(header.key.clone(), header.value.clone());
    }
    converted
}

pub fn to_field_table(headers: &BTreeMap<String, Option<Payload>>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.as_str()), to_amqp_value(value.as_ref()));
    }
    table
}

fn to_amqp_value(value: Option<&Payload>) -> AMQPValue {
    match value {
        Some(Payload::Text(s)) => AMQPValue::LongString(LongString::from(s.as_str())),
        Some(Payload::Binary(b)) => AMQPValue::ByteArray(ByteArray::from(b.to_vec())),
        None => AMQPValue::Void,
    }
}
