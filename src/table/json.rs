//! JSON records to Arrow and back
//!
//! Source objects are parsed into `serde_json` records first so that bad
//! lines can be dropped or reported one at a time. The records are then
//! handed to arrow-json for schema inference and decoding.

use crate::error::{Error, Result};
use crate::types::MalformedRecordPolicy;
use arrow::datatypes::{FieldRef, Schema};
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::json::{ArrayWriter, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Records parsed from one source object
#[derive(Debug, Default)]
pub struct ParsedRecords {
    /// JSON objects in source order
    pub records: Vec<Value>,
    /// Lines that were not JSON objects and got dropped
    pub malformed: usize,
}

impl ParsedRecords {
    fn accept(&mut self, value: Value, policy: MalformedRecordPolicy, source: &str) -> Result<()> {
        if value.is_object() {
            self.records.push(value);
            return Ok(());
        }
        match policy {
            MalformedRecordPolicy::Fail => Err(Error::source_read(
                source,
                format!("expected a JSON object, got {value}"),
            )),
            MalformedRecordPolicy::Drop => {
                warn!(source, "Dropping non-object record");
                self.malformed += 1;
                Ok(())
            }
        }
    }
}

/// Parse JSON text into object records
///
/// A document whose first non-blank character is `[` is read as a JSON array;
/// anything else is read as one JSON object per line.
pub fn parse_json_records(
    text: &str,
    policy: MalformedRecordPolicy,
    source: &str,
) -> Result<ParsedRecords> {
    let mut parsed = ParsedRecords::default();

    if text.trim_start().starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| Error::source_read(source, format!("invalid JSON array: {e}")))?;
        for value in values {
            parsed.accept(value, policy, source)?;
        }
        return Ok(parsed);
    }

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match (serde_json::from_str::<Value>(line), policy) {
            (Ok(value), _) => parsed.accept(value, policy, source)?,
            (Err(e), MalformedRecordPolicy::Fail) => {
                return Err(Error::source_read(
                    source,
                    format!("malformed record on line {}: {e}", idx + 1),
                ));
            }
            (Err(e), MalformedRecordPolicy::Drop) => {
                warn!(source, line = idx + 1, error = %e, "Dropping malformed record");
                parsed.malformed += 1;
            }
        }
    }

    Ok(parsed)
}

/// Nesting of a non-null JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Array,
    Object,
}

fn shape(value: &Value) -> Option<Shape> {
    match value {
        Value::Null => None,
        Value::Array(_) => Some(Shape::Array),
        Value::Object(_) => Some(Shape::Object),
        _ => Some(Shape::Scalar),
    }
}

/// Whether the values disagree on nesting at this level or anywhere below
fn has_shape_conflict(values: &[&Value]) -> bool {
    let mut seen = None;
    for current in values.iter().filter_map(|v| shape(v)) {
        match seen {
            None => seen = Some(current),
            Some(first) if first != current => return true,
            Some(_) => {}
        }
    }

    match seen {
        Some(Shape::Array) => {
            let items: Vec<&Value> = values
                .iter()
                .filter_map(|v| v.as_array())
                .flatten()
                .collect();
            has_shape_conflict(&items)
        }
        Some(Shape::Object) => {
            let mut children: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
            for object in values.iter().filter_map(|v| v.as_object()) {
                for (key, value) in object {
                    children.entry(key.as_str()).or_default().push(value);
                }
            }
            children.values().any(|child| has_shape_conflict(child))
        }
        _ => false,
    }
}

/// Rewrite fields whose values mix scalars, arrays and objects as JSON text
///
/// arrow-json cannot type such a field, so the whole field is read as Utf8
/// instead. Strings stay as they are and nulls stay null.
fn widen_conflicts(records: &[Value]) -> Cow<'_, [Value]> {
    let mut fields: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
    for record in records.iter().filter_map(Value::as_object) {
        for (key, value) in record {
            fields.entry(key.as_str()).or_default().push(value);
        }
    }

    let conflicted: Vec<&str> = fields
        .into_iter()
        .filter(|(_, values)| has_shape_conflict(values))
        .map(|(key, _)| key)
        .collect();
    if conflicted.is_empty() {
        return Cow::Borrowed(records);
    }
    warn!(fields = ?conflicted, "Mixed JSON shapes, reading fields as text");

    let widened = records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if let Some(object) = record.as_object_mut() {
                for key in &conflicted {
                    if let Some(value) = object.get_mut(*key) {
                        if !value.is_null() && !value.is_string() {
                            *value = Value::String(value.to_string());
                        }
                    }
                }
            }
            record
        })
        .collect();
    Cow::Owned(widened)
}

fn sorted_schema(records: &[Value]) -> Result<Schema> {
    let inferred = infer_json_schema_from_iterator(records.iter().map(Ok))?;

    let mut fields: Vec<FieldRef> = inferred.fields().iter().cloned().collect();
    fields.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(Schema::new(fields))
}

/// Infer an Arrow schema from JSON object records
///
/// Every field is nullable. Int64 and Float64 widen to Float64, any other
/// conflict falls back to Utf8, and a field that is only ever null stays
/// Null. Fields are sorted by name so repeated runs produce identical files.
pub fn infer_schema(records: &[Value]) -> Result<Schema> {
    sorted_schema(&widen_conflicts(records))
}

/// Convert JSON object records to a RecordBatch
///
/// Uses the provided schema or infers one. Missing fields become nulls and
/// scalars are coerced to string columns where the schema asks for one.
pub fn json_to_arrow(records: &[Value], schema: Option<&Schema>) -> Result<RecordBatch> {
    let widened = widen_conflicts(records);
    let records: &[Value] = &widened;
    let schema = Arc::new(match schema {
        Some(schema) => schema.clone(),
        None => sorted_schema(records)?,
    });

    if records.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut decoder = ReaderBuilder::new(Arc::clone(&schema))
        .with_batch_size(records.len())
        .with_coerce_primitive(true)
        .build_decoder()?;
    decoder.serialize(records)?;

    Ok(decoder
        .flush()?
        .unwrap_or_else(|| RecordBatch::new_empty(schema)))
}

/// Convert a RecordBatch to JSON objects
///
/// Null fields are omitted from the objects.
pub fn arrow_to_json(batch: &RecordBatch) -> Result<Vec<Value>> {
    let mut writer = ArrayWriter::new(Vec::new());
    writer.write(batch)?;
    writer.finish()?;

    let buf = writer.into_inner();
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&buf)?)
}
