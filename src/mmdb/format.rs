//! Section layout and metadata
//!
//! A database is laid out as node records, a 16-byte zero separator, the data
//! section, the metadata marker and finally the metadata map. The header is
//! recovered from the metadata alone; everything else is addressed by offset.

use super::types::{
    IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::data_section::{DataDecoder, DataValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Section offsets and tree shape
#[derive(Debug, Clone, Copy)]
pub struct MmdbHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version (4 or 6)
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Offset of the first data section byte
    pub data_section_start: usize,
    /// Offset of the metadata marker
    pub metadata_marker: usize,
}

impl MmdbHeader {
    /// Locate sections and read the fields needed for lookups
    pub fn from_file(data: &[u8]) -> Result<Self, MmdbError> {
        let metadata_marker = find_metadata_marker(data)?;
        let metadata = Metadata::from_file(data)?;

        let tree_size = metadata.node_count as usize * metadata.record_size.node_bytes();
        let data_section_start = tree_size + DATA_SECTION_SEPARATOR_SIZE;
        if data_section_start > metadata_marker {
            return Err(MmdbError::InvalidFormat(format!(
                "search tree of {} bytes overlaps the metadata at {}",
                tree_size, metadata_marker
            )));
        }

        Ok(MmdbHeader {
            node_count: metadata.node_count,
            record_size: metadata.record_size,
            ip_version: metadata.ip_version,
            tree_size,
            data_section_start,
            metadata_marker,
        })
    }
}

/// Decoded metadata map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// Always 2
    pub binary_format_major_version: u16,
    /// Always 0
    pub binary_format_minor_version: u16,
    /// Seconds since the Unix epoch
    pub build_epoch: u64,
    /// Free-form database type, e.g. "GeoIP2-City"
    pub database_type: String,
    /// Language code to description
    pub description: BTreeMap<String, String>,
    /// IP version of the search tree
    pub ip_version: IpVersion,
    /// Locale codes the data may contain
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Bits per node record
    pub record_size: RecordSize,
}

impl Metadata {
    /// Decode the metadata that follows the last marker in `data`
    pub fn from_file(data: &[u8]) -> Result<Self, MmdbError> {
        let marker = find_metadata_marker(data)?;
        let decoder = DataDecoder::new(&data[marker + METADATA_MARKER.len()..]);
        let value = decoder
            .decode(0)
            .map_err(|e| MmdbError::InvalidMetadata(format!("Failed to decode metadata: {}", e)))?;
        Self::from_value(&value)
    }

    /// Build from a decoded metadata map
    pub fn from_value(value: &DataValue) -> Result<Self, MmdbError> {
        let map = match value {
            DataValue::Map(map) => map,
            _ => {
                return Err(MmdbError::InvalidMetadata(
                    "Metadata is not a map".to_string(),
                ))
            }
        };

        let ip_version = match extract_uint(map, "ip_version")? {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            n => {
                return Err(MmdbError::InvalidMetadata(format!(
                    "Invalid IP version: {}",
                    n
                )))
            }
        };

        let node_count = u32::try_from(extract_uint(map, "node_count")?)
            .map_err(|_| MmdbError::InvalidMetadata("node_count exceeds 32 bits".to_string()))?;

        let description = match map.get("description") {
            Some(DataValue::Map(entries)) => entries
                .iter()
                .map(|(lang, text)| match text {
                    DataValue::String(s) => Ok((lang.clone(), s.clone())),
                    _ => Err(MmdbError::InvalidMetadata(format!(
                        "description for '{}' is not a string",
                        lang
                    ))),
                })
                .collect::<Result<_, _>>()?,
            None => BTreeMap::new(),
            Some(_) => {
                return Err(MmdbError::InvalidMetadata(
                    "description is not a map".to_string(),
                ))
            }
        };

        let languages = match map.get("languages") {
            Some(DataValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        MmdbError::InvalidMetadata("language is not a string".to_string())
                    })
                })
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
            Some(_) => {
                return Err(MmdbError::InvalidMetadata(
                    "languages is not an array".to_string(),
                ))
            }
        };

        Ok(Metadata {
            binary_format_major_version: extract_uint(map, "binary_format_major_version")? as u16,
            binary_format_minor_version: extract_uint(map, "binary_format_minor_version")? as u16,
            build_epoch: extract_uint(map, "build_epoch")?,
            database_type: match map.get("database_type") {
                Some(DataValue::String(s)) => s.clone(),
                _ => {
                    return Err(MmdbError::InvalidMetadata(
                        "Required field 'database_type' not found".to_string(),
                    ))
                }
            },
            description,
            ip_version,
            languages,
            node_count,
            record_size: RecordSize::from_bits(extract_uint(map, "record_size")? as u16)?,
        })
    }

    /// Metadata as the map written after the marker
    pub fn to_value(&self) -> DataValue {
        let mut map = HashMap::new();
        map.insert(
            "binary_format_major_version".to_string(),
            DataValue::Uint16(self.binary_format_major_version),
        );
        map.insert(
            "binary_format_minor_version".to_string(),
            DataValue::Uint16(self.binary_format_minor_version),
        );
        map.insert("build_epoch".to_string(), DataValue::Uint64(self.build_epoch));
        map.insert(
            "database_type".to_string(),
            DataValue::String(self.database_type.clone()),
        );
        map.insert(
            "description".to_string(),
            DataValue::Map(
                self.description
                    .iter()
                    .map(|(k, v)| (k.clone(), DataValue::String(v.clone())))
                    .collect(),
            ),
        );
        map.insert(
            "ip_version".to_string(),
            DataValue::Uint16(self.ip_version.number()),
        );
        map.insert(
            "languages".to_string(),
            DataValue::Array(
                self.languages
                    .iter()
                    .map(|l| DataValue::String(l.clone()))
                    .collect(),
            ),
        );
        map.insert("node_count".to_string(), DataValue::Uint32(self.node_count));
        map.insert(
            "record_size".to_string(),
            DataValue::Uint16(self.record_size.bits()),
        );
        DataValue::Map(map)
    }
}

/// Find the last metadata marker in the file
///
/// The marker appears within the last 128KB of a well-formed file.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, MmdbError> {
    const SEARCH_SIZE: usize = 128 * 1024;

    if data.len() < METADATA_MARKER.len() {
        return Err(MmdbError::MetadataNotFound);
    }

    let search_start = data.len().saturating_sub(SEARCH_SIZE);
    data[search_start..]
        .windows(METADATA_MARKER.len())
        .rposition(|window| window == METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(MmdbError::MetadataNotFound)
}

fn extract_uint(map: &HashMap<String, DataValue>, key: &str) -> Result<u64, MmdbError> {
    match map.get(key) {
        Some(value) => value.as_u64().ok_or_else(|| {
            MmdbError::InvalidMetadata(format!("Field '{}' is not an unsigned integer", key))
        }),
        None => Err(MmdbError::InvalidMetadata(format!(
            "Required field '{}' not found",
            key
        ))),
    }
}
