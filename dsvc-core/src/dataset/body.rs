// src/dataset/body.rs
//! Body codecs: row counting, schema inference, validation and format conversion
//! for `json` (top-level array) and `csv` bodies.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use super::{FormatConfig, Structure};
use crate::error::{RepoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Csv,
}

impl BodyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyFormat::Json => "json",
            BodyFormat::Csv => "csv",
        }
    }

    /// Guess a format from a filename extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        ext.parse().ok()
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyFormat {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(BodyFormat::Json),
            "csv" => Ok(BodyFormat::Csv),
            other => Err(RepoError::Validation(format!("unsupported body format \"{other}\""))),
        }
    }
}

fn csv_err(e: csv::Error) -> RepoError {
    RepoError::Validation(format!("reading csv body: {e}"))
}

/// Decode body bytes into rows. For csv with a header row, the header is skipped.
pub fn read_rows(bytes: &[u8], format: BodyFormat, header_row: bool) -> Result<Vec<Value>> {
    match format {
        BodyFormat::Json => {
            let v: Value = serde_json::from_slice(bytes)
                .map_err(|e| RepoError::Validation(format!("reading json body: {e}")))?;
            match v {
                Value::Array(rows) => Ok(rows),
                Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
                _ => Err(RepoError::Validation(
                    "json body must be an array or an object".to_string(),
                )),
            }
        }
        BodyFormat::Csv => {
            let mut rows = Vec::new();
            for (i, rec) in csv_records(bytes)?.into_iter().enumerate() {
                if i == 0 && header_row {
                    continue;
                }
                rows.push(Value::Array(rec.iter().map(|f| typed_value(f)).collect()));
            }
            Ok(rows)
        }
    }
}

fn csv_records(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(csv_err)?;
        out.push(rec.iter().map(str::to_string).collect());
    }
    Ok(out)
}

fn typed_value(field: &str) -> Value {
    if let Ok(i) = field.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        if f.is_finite() {
            return json!(f);
        }
    }
    match field {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(field.to_string()),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A csv body starts with a header when its first record is all text and a
/// later record has a non-text field.
fn looks_like_header(records: &[Vec<String>]) -> bool {
    let Some((first, rest)) = records.split_first() else {
        return false;
    };
    let all_text = first.iter().all(|f| matches!(typed_value(f), Value::String(_)));
    all_text
        && rest
            .iter()
            .any(|r| r.iter().any(|f| !matches!(typed_value(f), Value::String(_))))
}

/// Build a structure for a body that arrives without one.
pub fn infer_structure(format: BodyFormat, bytes: &[u8]) -> Result<Structure> {
    let mut st = Structure {
        format: format.as_str().to_string(),
        ..Default::default()
    };
    match format {
        BodyFormat::Json => {
            let rows = read_rows(bytes, format, false)?;
            let item_type = rows.first().map(type_name).unwrap_or("array");
            st.schema = Some(json!({ "type": "array", "items": { "type": item_type } }));
        }
        BodyFormat::Csv => {
            let records = csv_records(bytes)?;
            let header = looks_like_header(&records);
            let sample = if header { records.get(1) } else { records.first() };
            let columns: Vec<Value> = sample
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, f)| {
                            let title = if header {
                                records[0].get(i).cloned().unwrap_or_else(|| format!("field_{}", i + 1))
                            } else {
                                format!("field_{}", i + 1)
                            };
                            json!({ "title": title, "type": type_name(&typed_value(f)) })
                        })
                        .collect()
                })
                .unwrap_or_default();
            st.format_config = Some(FormatConfig { header_row: header });
            st.schema = Some(json!({
                "type": "array",
                "items": { "type": "array", "items": columns },
            }));
        }
    }
    Ok(st)
}

/// Recompute row count, size and schema error count for `bytes`.
pub fn describe(st: &mut Structure, bytes: &[u8]) -> Result<()> {
    let format = st.body_format()?;
    let rows = read_rows(bytes, format, st.header_row())?;
    st.entries = rows.len() as u64;
    st.length = bytes.len() as u64;
    st.err_count = count_errors(st.schema.as_ref(), &rows);
    Ok(())
}

/// Rows whose type or width disagrees with the schema's `items`.
pub fn count_errors(schema: Option<&Value>, rows: &[Value]) -> u64 {
    let Some(items) = schema.and_then(|s| s.get("items")) else {
        return 0;
    };
    let want = items.get("type").and_then(Value::as_str);
    let width = items.get("items").and_then(Value::as_array).map(Vec::len).filter(|n| *n > 0);
    rows.iter()
        .filter(|row| {
            if let Some(want) = want {
                if type_name(row) != want {
                    return true;
                }
            }
            match (width, row.as_array()) {
                (Some(n), Some(cells)) => cells.len() != n,
                _ => false,
            }
        })
        .count() as u64
}

/// Re-encode a body from one structure's format to another's.
pub fn convert(bytes: &[u8], from: &Structure, to: &Structure) -> Result<Vec<u8>> {
    let rows = read_rows(bytes, from.body_format()?, from.header_row())?;
    match to.body_format()? {
        BodyFormat::Json => Ok(serde_json::to_vec(&Value::Array(rows))?),
        BodyFormat::Csv => {
            let mut w = csv::Writer::from_writer(Vec::new());
            if to.header_row() {
                if let Some(titles) = schema_titles(to.schema.as_ref()) {
                    w.write_record(&titles).map_err(csv_err)?;
                }
            }
            for row in &rows {
                let cells: Vec<String> = match row {
                    Value::Array(cells) => cells.iter().map(cell_text).collect(),
                    Value::Object(map) => map.values().map(cell_text).collect(),
                    other => vec![cell_text(other)],
                };
                w.write_record(&cells).map_err(csv_err)?;
            }
            w.into_inner()
                .map_err(|e| RepoError::Validation(format!("writing csv body: {e}")))
        }
    }
}

fn schema_titles(schema: Option<&Value>) -> Option<Vec<String>> {
    let cols = schema?.pointer("/items/items")?.as_array()?;
    cols.iter()
        .map(|c| c.get("title").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
