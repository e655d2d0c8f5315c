// Output serialization
// Cell coercion by declared output type, JSON orientations and the heavy binary payload

use crate::error::EngineError;
use crate::models::input::Orient;
use crate::models::model_info::OutputType;
use crate::models::plan::Row;
use crate::process_manager::{encode_heavy_bytes, HeavyBlock, HeavyDescriptor};
use serde_json::{json, Map, Number, Value};

pub const HEAVY_CONTENT_DISPOSITION: &str = "attachment; filename=result.bin";
pub const HEAVY_MEDIA_TYPE: &str = "application/octet-stream";

/// Coerce one cell. Empty or unparsable numeric cells become null.
pub fn coerce_cell(cell: &str, output_type: OutputType) -> Value {
    match output_type {
        OutputType::String => Value::String(cell.to_string()),
        OutputType::Float => parse_float(cell)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        OutputType::Integer => parse_integer(cell).map(Value::from).unwrap_or(Value::Null),
    }
}

fn parse_float(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Integral floats such as "5.0" are accepted
fn parse_integer(cell: &str) -> Option<i64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok().or_else(|| {
        parse_float(trimmed)
            .filter(|v| v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Coerced cells of one row, padded with nulls to the header width.
/// A missing row is all nulls.
fn coerce_row(row: Option<&Row>, width: usize, output_type: OutputType) -> Vec<Value> {
    (0..width)
        .map(|col| {
            row.and_then(|cells| cells.get(col))
                .map(|cell| coerce_cell(cell, output_type))
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Shape rows into the requested orientation.
/// `index` labels rows (normally the input values); it is extended with positions if short.
pub fn orient_to_json(
    rows: &[Option<Row>],
    header: &[String],
    index: &[String],
    orient: Orient,
    output_type: OutputType,
) -> Value {
    let width = header.len();
    let matrix: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| coerce_row(row.as_ref(), width, output_type))
        .collect();
    let labels: Vec<String> = (0..rows.len())
        .map(|i| index.get(i).cloned().unwrap_or_else(|| i.to_string()))
        .collect();

    match orient {
        Orient::Split => json!({
            "columns": header,
            "index": labels,
            "data": matrix,
        }),
        Orient::Records => Value::Array(matrix.into_iter().map(|cells| record(header, cells)).collect()),
        Orient::Index => {
            let mut out = Map::new();
            for (label, cells) in labels.into_iter().zip(matrix) {
                out.insert(label, record(header, cells));
            }
            Value::Object(out)
        }
        Orient::Columns => {
            let mut out = Map::new();
            for (col, name) in header.iter().enumerate() {
                let mut column = Map::new();
                for (label, cells) in labels.iter().zip(&matrix) {
                    column.insert(label.clone(), cells[col].clone());
                }
                out.insert(name.clone(), Value::Object(column));
            }
            Value::Object(out)
        }
        Orient::Values => {
            if width == 1 {
                Value::Array(matrix.into_iter().flatten().collect())
            } else {
                Value::Array(
                    rows.iter()
                        .zip(matrix)
                        .map(|(row, cells)| if row.is_some() { Value::Array(cells) } else { Value::Null })
                        .collect(),
                )
            }
        }
    }
}

fn record(header: &[String], cells: Vec<Value>) -> Value {
    let mut map = Map::new();
    for (name, cell) in header.iter().zip(cells) {
        map.insert(name.clone(), cell);
    }
    Value::Object(map)
}

/// Binary response body with its transport headers
#[derive(Debug, Clone, PartialEq)]
pub struct HeavyPayload {
    pub bytes: Vec<u8>,
    pub descriptor: HeavyDescriptor,
}

impl HeavyPayload {
    pub fn content_disposition(&self) -> &'static str {
        HEAVY_CONTENT_DISPOSITION
    }

    pub fn media_type(&self) -> &'static str {
        HEAVY_MEDIA_TYPE
    }

    pub fn content_length(&self) -> usize {
        self.bytes.len()
    }
}

/// Wrap a model's heavy buffer for transport; elements keep the dtype the model wrote
pub fn heavy_payload(block: &HeavyBlock) -> Result<HeavyPayload, EngineError> {
    Ok(HeavyPayload {
        bytes: encode_heavy_bytes(block)?,
        descriptor: block.descriptor().clone(),
    })
}
