//! Structured ("rich") output for table- and array-shaped results.
//!
//! A pure value→document translation: when a cell's trailing expression
//! looks like tabular or numeric array data, a JSON document describing it
//! is attached to the execution result so clients can render it as a grid
//! instead of a repr string.

use serde_json::json;

use super::value::{self, Value};

/// Maximum rows included in a table document.
const MAX_ROWS: usize = 100;
/// Maximum elements included in an array document.
const MAX_ELEMENTS: usize = 1000;

/// Translate a result value into a rich-output document, if it has a
/// recognizable shape. Returns `None` for everything else.
pub fn to_rich(value: &Value) -> Option<serde_json::Value> {
    let Value::List(items) = value else {
        return None;
    };
    let items = items.borrow();
    if items.is_empty() {
        return None;
    }

    if items.iter().all(is_scalar_dict) {
        return table_document(&items);
    }

    if items.iter().all(is_number) {
        return array_document(&items);
    }

    if let Some(width) = matrix_width(&items) {
        return matrix_document(&items, width);
    }

    None
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_))
}

fn is_scalar(v: &Value) -> bool {
    matches!(
        v,
        Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
    )
}

fn is_scalar_dict(v: &Value) -> bool {
    match v {
        Value::Dict(pairs) => pairs
            .borrow()
            .iter()
            .all(|(k, v)| matches!(k, Value::Str(_)) && is_scalar(v)),
        _ => false,
    }
}

/// Rows of uniform width, all numeric, form a matrix.
fn matrix_width(items: &[Value]) -> Option<usize> {
    let mut width = None;
    for item in items {
        let Value::List(row) = item else {
            return None;
        };
        let row = row.borrow();
        if !row.iter().all(is_number) {
            return None;
        }
        match width {
            None => width = Some(row.len()),
            Some(w) if w == row.len() => {}
            _ => return None,
        }
    }
    width.filter(|w| *w > 0)
}

fn table_document(items: &[Value]) -> Option<serde_json::Value> {
    // Columns in order of first appearance across all rows.
    let mut columns: Vec<String> = Vec::new();
    for item in items {
        let Value::Dict(pairs) = item else {
            return None;
        };
        for (k, _) in pairs.borrow().iter() {
            let name = k.str_value();
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let truncated = items.len() > MAX_ROWS;
    let mut data = Vec::new();
    for item in items.iter().take(MAX_ROWS) {
        let Value::Dict(pairs) = item else {
            return None;
        };
        let mut row = serde_json::Map::new();
        for (k, v) in pairs.borrow().iter() {
            row.insert(k.str_value(), value::to_json(v).ok()?);
        }
        data.push(serde_json::Value::Object(row));
    }

    Some(json!({
        "type": "table",
        "columns": columns,
        "data": data,
        "shape": [items.len(), columns.len()],
        "truncated": truncated,
    }))
}

fn array_document(items: &[Value]) -> Option<serde_json::Value> {
    let truncated = items.len() > MAX_ELEMENTS;
    let data: Vec<serde_json::Value> = items
        .iter()
        .take(MAX_ELEMENTS)
        .map(|v| value::to_json(v).ok())
        .collect::<Option<_>>()?;
    Some(json!({
        "type": "array",
        "data": data,
        "shape": [items.len()],
        "truncated": truncated,
    }))
}

fn matrix_document(items: &[Value], width: usize) -> Option<serde_json::Value> {
    // Cap both dimensions, mirroring the flat-array element cap.
    let max_dim = (MAX_ELEMENTS as f64).sqrt() as usize;
    let row_limit = items.len().min(max_dim);
    let col_limit = width.min(max_dim);
    let truncated = items.len() > row_limit || width > col_limit;

    let mut data = Vec::with_capacity(row_limit);
    for item in items.iter().take(row_limit) {
        let Value::List(row) = item else {
            return None;
        };
        let row = row.borrow();
        let json_row: Vec<serde_json::Value> = row
            .iter()
            .take(col_limit)
            .map(|v| value::to_json(v).ok())
            .collect::<Option<_>>()?;
        data.push(serde_json::Value::Array(json_row));
    }

    Some(json!({
        "type": "array",
        "data": data,
        "shape": [items.len(), width],
        "truncated": truncated,
    }))
}
