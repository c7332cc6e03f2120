//! Source records and input files
//!
//! A source is anything that yields `(key, value)` pairs for a tree: the
//! key is a CIDR network, a bare address, or an inclusive `start-end`
//! address range. Files ending in `.gz` are decompressed transparently.
//!
//! # Example
//!
//! ```rust,no_run
//! use mmdbforge::source::{self, SourceKey};
//!
//! let key: SourceKey = "10.0.0.1-10.0.0.9".parse()?;
//! let reader = source::open("networks.json.gz")?;
//! for record in source::json_records(reader) {
//!     println!("{:?}", record?.key);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::data_section::DataValue;
use crate::error::{Result, WriterError};
use flate2::read::GzDecoder;
use ipnet::IpNet;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

/// Buffer size for file reading (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Where a source record applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKey {
    /// A CIDR network (bare addresses become host networks)
    Network(IpNet),
    /// An inclusive address range
    Range(IpAddr, IpAddr),
}

impl FromStr for SourceKey {
    type Err = WriterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.contains('/') {
            return s
                .parse::<IpNet>()
                .map(SourceKey::Network)
                .map_err(|e| WriterError::invalid_network(format!("'{}': {}", s, e)));
        }
        if let Some((start, end)) = s.split_once('-') {
            let parse = |part: &str| {
                part.trim().parse::<IpAddr>().map_err(|e| {
                    WriterError::invalid_range(format!("'{}' in '{}': {}", part.trim(), s, e))
                })
            };
            return Ok(SourceKey::Range(parse(start)?, parse(end)?));
        }
        s.parse::<IpAddr>()
            .map(|addr| SourceKey::Network(IpNet::from(addr)))
            .map_err(|e| WriterError::invalid_network(format!("'{}': {}", s, e)))
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Network(net) => write!(f, "{}", net),
            SourceKey::Range(start, end) => write!(f, "{}-{}", start, end),
        }
    }
}

/// One `(key, value)` pair from a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Network or range the value applies to
    pub key: SourceKey,
    /// Value to insert
    pub value: DataValue,
}

impl SourceRecord {
    /// Create a record
    pub fn new(key: SourceKey, value: DataValue) -> Self {
        Self { key, value }
    }
}

#[derive(Deserialize)]
struct JsonRecord {
    #[serde(alias = "range", alias = "key")]
    network: String,
    data: serde_json::Value,
}

impl JsonRecord {
    fn into_record(self) -> Result<SourceRecord> {
        Ok(SourceRecord {
            key: self.network.parse()?,
            value: DataValue::from_json(&self.data)?,
        })
    }
}

/// Records from JSON input
///
/// Accepts either one array of `{"network": ..., "data": ...}` objects or a
/// stream of such objects (JSON Lines). `range` and `key` are accepted in
/// place of `network`.
pub fn json_records<R: Read>(mut reader: R) -> Box<dyn Iterator<Item = Result<SourceRecord>>> {
    let mut text = String::new();
    if let Err(e) = reader.read_to_string(&mut text) {
        return Box::new(std::iter::once(Err(WriterError::Format(format!(
            "reading JSON input: {}",
            e
        )))));
    }

    if text.trim_start().starts_with('[') {
        match serde_json::from_str::<Vec<JsonRecord>>(&text) {
            Ok(records) => Box::new(records.into_iter().map(JsonRecord::into_record)),
            Err(e) => Box::new(std::iter::once(Err(json_error(e)))),
        }
    } else {
        let records: Vec<_> = serde_json::Deserializer::from_str(&text)
            .into_iter::<JsonRecord>()
            .collect();
        Box::new(
            records
                .into_iter()
                .map(|r| r.map_err(json_error).and_then(JsonRecord::into_record)),
        )
    }
}

fn json_error(e: serde_json::Error) -> WriterError {
    WriterError::Format(format!("invalid JSON record: {}", e))
}

/// Open an input file with automatic gzip detection based on file extension
///
/// Files ending in `.gz` (case-insensitive) are decompressed. The path "-"
/// reads from stdin.
pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();

    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file = File::open(path)?;

    let is_gzip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}
