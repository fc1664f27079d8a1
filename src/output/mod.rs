use std::collections::BTreeSet;
use std::io::Write;

use clap::ValueEnum;
use serde_json::{Map, Value};

/// Output formats selectable through the global `--format` flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Key=value lines per record, separated by `---`.
    #[default]
    Text,
    /// Pretty-printed JSON of the raw response.
    Json,
    /// One compact JSON object per record.
    Jsonl,
    /// Flattened rows under a lexicographically sorted header.
    Csv,
}

/// Field names the service uses to wrap record collections.
const COLLECTION_KEYS: [&str; 11] = [
    "accounts",
    "results",
    "transactions",
    "categories",
    "householdTransactionTags",
    "credentials",
    "budgetData",
    "recurringTransactions",
    "splits",
    "snapshots",
    "history",
];

const KEY_SEPARATOR: char = '.';

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("failed to serialise response: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract the list of records a response logically contains.
///
/// Response envelopes are heterogeneous and operation-specific, so this
/// degrades through a fixed priority order: a bare array is returned
/// verbatim; a paginated envelope (`{"allX": {"results": [...]}}`) yields
/// the inner results; a known collection field yields its array; any other
/// object is treated as a single record. Scalars and null yield nothing.
pub fn extract_records(response: &Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            for value in map.values() {
                if let Some(results) = value.get("results").and_then(Value::as_array) {
                    return results.clone();
                }
            }
            for (key, value) in map {
                if COLLECTION_KEYS.contains(&key.as_str()) {
                    if let Value::Array(items) = value {
                        return items.clone();
                    }
                }
            }
            vec![response.clone()]
        }
        _ => Vec::new(),
    }
}

/// Flatten a record to a single level by joining nested object keys with `.`.
///
/// Arrays collapse to their compact JSON text (empty arrays to an empty
/// string); scalars, including null, pass through untouched. Key order
/// follows the source object, parents before children.
pub fn flatten_record(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, record);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let joined = match prefix {
            Some(prefix) => format!("{prefix}{KEY_SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(flat, Some(&joined), inner),
            Value::Array(items) => {
                let text = if items.is_empty() {
                    String::new()
                } else {
                    value.to_string()
                };
                flat.insert(joined, Value::String(text));
            }
            scalar => {
                flat.insert(joined, scalar.clone());
            }
        }
    }
}

/// Render a response to the writer in the requested format.
///
/// Every format writes to the given writer only; the response is never
/// mutated. The raw response shape is preserved for `json`; the remaining
/// formats render the normalised records.
pub fn render(out: &mut impl Write, response: &Value, format: OutputFormat) -> Result<(), RenderError> {
    match format {
        OutputFormat::Json => render_json(out, response),
        OutputFormat::Jsonl => render_jsonl(out, response),
        OutputFormat::Csv => render_csv(out, response),
        OutputFormat::Text => render_text(out, response),
    }
}

fn render_json(out: &mut impl Write, response: &Value) -> Result<(), RenderError> {
    writeln!(out, "{}", serde_json::to_string_pretty(response)?)?;
    Ok(())
}

fn render_jsonl(out: &mut impl Write, response: &Value) -> Result<(), RenderError> {
    for record in extract_records(response) {
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }
    Ok(())
}

fn render_csv(out: &mut impl Write, response: &Value) -> Result<(), RenderError> {
    let records = extract_records(response);
    if records.is_empty() {
        return Ok(());
    }
    let rows: Vec<Map<String, Value>> = records.iter().map(flatten_for_row).collect();
    let columns: Vec<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in &rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|column| row.get(*column).map(scalar_text).unwrap_or_default())
            .collect();
        writer.write_record(&fields)?;
    }
    let encoded = writer
        .into_inner()
        .map_err(|err| RenderError::Io(std::io::Error::other(err.to_string())))?;
    writeln!(out, "{}", String::from_utf8_lossy(&encoded).trim_end())?;
    Ok(())
}

fn render_text(out: &mut impl Write, response: &Value) -> Result<(), RenderError> {
    for (index, record) in extract_records(response).iter().enumerate() {
        if index > 0 {
            writeln!(out, "---")?;
        }
        match record {
            Value::Object(map) => {
                let flat = flatten_record(map);
                let mut keys: Vec<&String> = flat.keys().collect();
                keys.sort();
                for key in keys {
                    let text = flat.get(key.as_str()).map(scalar_text).unwrap_or_default();
                    writeln!(out, "{key}={text}")?;
                }
            }
            other => writeln!(out, "{}", scalar_text(other))?,
        }
    }
    Ok(())
}

fn flatten_for_row(record: &Value) -> Map<String, Value> {
    match record {
        Value::Object(map) => flatten_record(map),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
