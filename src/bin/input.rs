//! CSV and JSON source files for the build command

use anyhow::{Context, Result};
use mmdbforge::source::{self, SourceRecord};
use mmdbforge::{DataValue, WriterError};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Input file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Parse an explicit `--format` value
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "json" | "jsonl" | "ndjson" => Ok(InputFormat::Json),
            other => anyhow::bail!("Unknown format: {}. Use 'csv' or 'json'", other),
        }
    }

    /// Guess from the file extension, looking through a trailing `.gz`
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy().to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        Self::parse(ext).with_context(|| {
            format!(
                "Cannot tell the format of {}; pass --format csv|json",
                path.display()
            )
        })
    }
}

/// All records of one input file
pub fn read_records(path: &Path, format: InputFormat) -> Result<Vec<mmdbforge::Result<SourceRecord>>> {
    let reader = source::open(path)
        .with_context(|| format!("Failed to open input: {}", path.display()))?;
    Ok(match format {
        InputFormat::Json => source::json_records(reader).collect(),
        InputFormat::Csv => csv_records(reader)?,
    })
}

/// Records from CSV with a header row
///
/// One column named `network`, `range` or `key` holds the key; every other
/// non-empty cell becomes an entry of the record's map.
pub fn csv_records<R: Read>(reader: R) -> Result<Vec<mmdbforge::Result<SourceRecord>>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers().context("Failed to read CSV headers")?.clone();

    let key_col = headers
        .iter()
        .position(|h| matches!(h.trim(), "network" | "range" | "key"))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "CSV must have a 'network', 'range' or 'key' column. Found headers: {}",
                headers.iter().collect::<Vec<_>>().join(", ")
            )
        })?;

    let data_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != key_col)
        .map(|(i, name)| (i, name.trim().to_string()))
        .collect();

    let records = reader
        .records()
        .enumerate()
        .map(|(row_num, result)| -> mmdbforge::Result<SourceRecord> {
            let row = result.map_err(|e| {
                WriterError::Format(format!("CSV row {}: {}", row_num + 2, e))
            })?;
            let key = row.get(key_col).ok_or_else(|| {
                WriterError::Format(format!("Missing key column at row {}", row_num + 2))
            })?;

            let mut data = HashMap::new();
            for (col_idx, col_name) in &data_cols {
                if let Some(cell) = row.get(*col_idx) {
                    if !cell.is_empty() {
                        data.insert(col_name.clone(), sniff_value(cell));
                    }
                }
            }
            Ok(SourceRecord::new(key.parse()?, DataValue::Map(data)))
        })
        .collect();
    Ok(records)
}

/// Smallest fitting number type, a bool, or the text itself
fn sniff_value(cell: &str) -> DataValue {
    if let Ok(u) = cell.parse::<u32>() {
        DataValue::Uint32(u)
    } else if let Ok(u) = cell.parse::<u64>() {
        DataValue::Uint64(u)
    } else if let Ok(i) = cell.parse::<i32>() {
        DataValue::Int32(i)
    } else if let Some(f) = cell.parse::<f64>().ok().filter(|f| f.is_finite()) {
        DataValue::Double(f)
    } else if cell == "true" || cell == "false" {
        DataValue::Bool(cell == "true")
    } else {
        DataValue::String(cell.to_string())
    }
}
