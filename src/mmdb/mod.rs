//! MaxMind DB format
//!
//! Layout constants, metadata, search tree traversal and a reader for
//! finished databases. Values are decoded with
//! `crate::data_section::DataDecoder`.
//!
//! ## Architecture
//!
//! - **types**: format constants, record size, IP version, reader errors
//! - **format**: section offsets and the metadata map
//! - **tree**: search tree records and lookups
//! - **reader**: opening files, lookups and network iteration

pub mod format;
pub mod reader;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, Metadata, MmdbHeader};
pub use reader::{Networks, Reader};
pub use types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
