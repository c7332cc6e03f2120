//! Format-level type definitions shared by the writer and the reader

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Width of the all-zero separator between the node section and data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Reader-side error types
#[derive(Debug, Clone)]
pub enum MmdbError {
    /// Invalid file format
    InvalidFormat(String),
    /// Metadata not found
    MetadataNotFound,
    /// Invalid metadata structure
    InvalidMetadata(String),
    /// Data decoding error (wraps DataDecoder errors)
    DecodeError(String),
    /// IO error
    IoError(String),
    /// Invalid IP address
    InvalidIpAddress(String),
    /// Network/IP lookup error
    LookupError(String),
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::InvalidFormat(msg) => write!(f, "Invalid MMDB format: {}", msg),
            MmdbError::MetadataNotFound => write!(f, "MMDB metadata marker not found"),
            MmdbError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            MmdbError::DecodeError(msg) => write!(f, "Data decode error: {}", msg),
            MmdbError::IoError(msg) => write!(f, "IO error: {}", msg),
            MmdbError::InvalidIpAddress(msg) => write!(f, "Invalid IP address: {}", msg),
            MmdbError::LookupError(msg) => write!(f, "Lookup error: {}", msg),
        }
    }
}

impl std::error::Error for MmdbError {}

impl From<&'static str> for MmdbError {
    fn from(msg: &'static str) -> Self {
        MmdbError::DecodeError(msg.to_string())
    }
}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::IoError(err.to_string())
    }
}

/// IP version of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum IpVersion {
    /// IPv4 only (32-bit tree)
    V4,
    /// IPv6 (128-bit tree, IPv4 reachable under ::/96)
    V6,
}

impl IpVersion {
    /// Tree depth in bits
    pub fn bit_count(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Value of the `ip_version` metadata key
    pub fn number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl TryFrom<u16> for IpVersion {
    type Error = String;

    fn try_from(n: u16) -> Result<Self, Self::Error> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(format!("Invalid IP version: {}", n)),
        }
    }
}

impl From<IpVersion> for u16 {
    fn from(v: IpVersion) -> Self {
        v.number()
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Record width in bits
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Largest value a record can hold
    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self, MmdbError> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(MmdbError::InvalidFormat(format!(
                "Invalid record size: {} bits",
                bits
            ))),
        }
    }
}

impl TryFrom<u16> for RecordSize {
    type Error = String;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        RecordSize::from_bits(bits).map_err(|e| e.to_string())
    }
}

impl From<RecordSize> for u16 {
    fn from(size: RecordSize) -> Self {
        size.bits()
    }
}
