/// Error types for the mmdbforge library
use crate::mmdb::MmdbError;
use ipnet::IpNet;
use std::fmt;
use thiserror::Error;

/// Result type alias for tree building and serialization
pub type Result<T> = std::result::Result<T, WriterError>;

/// Section of the output file being written when an I/O error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Fixed-width node records
    NodeSection,
    /// Separator and deduplicated data section
    DataSection,
    /// Metadata marker and metadata map
    MetadataSection,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::NodeSection => write!(f, "node section"),
            WritePhase::DataSection => write!(f, "data section"),
            WritePhase::MetadataSection => write!(f, "metadata section"),
        }
    }
}

/// Main error type for tree building and serialization
#[derive(Error, Debug)]
pub enum WriterError {
    /// Insert reached into a reserved network
    #[error("attempt to insert {inserted}, which is in the reserved network {reserved}")]
    ReservedNetwork {
        /// Network passed to the insert
        inserted: IpNet,
        /// Reserved network it collided with
        reserved: IpNet,
    },

    /// Insert reached into an aliased network
    #[error("attempt to insert {inserted}, which is in the aliased network {alias}")]
    AliasedNetwork {
        /// Network passed to the insert
        inserted: IpNet,
        /// Alias network it collided with
        alias: IpNet,
    },

    /// Network does not fit the tree (wrong family, bad prefix)
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Address range is empty, reversed, or mixes families
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// A value or the data section outgrew what the format can address
    #[error("Encoding limit exceeded: {0}")]
    EncodingLimit(String),

    /// A node record does not fit in the configured record width
    #[error(
        "record value {value} does not fit in a {record_size}-bit record; \
         use a larger record size or reduce the amount of data"
    )]
    Capacity {
        /// Computed record value
        value: u64,
        /// Configured record width in bits
        record_size: u16,
    },

    /// Serializer and finalized tree disagree; indicates a bug
    #[error("Internal consistency fault: {0}")]
    InternalConsistency(String),

    /// Output sink failed
    #[error("I/O error writing {phase}: {source}")]
    Io {
        /// Section being written
        phase: WritePhase,
        /// Underlying error
        source: std::io::Error,
    },

    /// A merge strategy could not combine the old and new values
    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    /// Existing database could not be decoded
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid tree options
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WriterError {
    /// Create an invalid network error
    pub fn invalid_network(msg: impl Into<String>) -> Self {
        WriterError::InvalidNetwork(msg.into())
    }

    /// Create an invalid range error
    pub fn invalid_range(msg: impl Into<String>) -> Self {
        WriterError::InvalidRange(msg.into())
    }

    /// Create an encoding limit error
    pub fn encoding_limit(msg: impl Into<String>) -> Self {
        WriterError::EncodingLimit(msg.into())
    }

    /// Create an internal consistency error
    pub fn internal(msg: impl Into<String>) -> Self {
        WriterError::InternalConsistency(msg.into())
    }

    /// Create a merge conflict error
    pub fn merge_conflict(msg: impl Into<String>) -> Self {
        WriterError::MergeConflict(msg.into())
    }

    /// Wrap a sink error with the section being written
    pub fn io(phase: WritePhase, source: std::io::Error) -> Self {
        WriterError::Io { phase, source }
    }

    /// True for reserved/alias boundary violations
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            WriterError::ReservedNetwork { .. } | WriterError::AliasedNetwork { .. }
        )
    }
}

impl From<MmdbError> for WriterError {
    fn from(err: MmdbError) -> Self {
        WriterError::Format(err.to_string())
    }
}
