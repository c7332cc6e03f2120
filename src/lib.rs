//! mmdbforge - Builder for MaxMind DB Files
//!
//! mmdbforge builds immutable, compact IP databases in the MaxMind DB format.
//! Networks are inserted into a binary trie with caller-controlled merge
//! semantics; identical values are stored once and repeated data is
//! compressed with pointers when the file is written.
//!
//! # Quick Start
//!
//! ```rust
//! use mmdbforge::{DataValue, IpTreeBuilder, TreeOptions};
//!
//! let mut tree = IpTreeBuilder::new(TreeOptions::default().with_build_epoch(0))?;
//!
//! tree.insert_value(
//!     "1.1.1.0/24".parse()?,
//!     DataValue::from([("city", "Sydney"), ("country", "AU")]),
//! )?;
//!
//! // More specific networks win inside their own range
//! tree.insert_value("1.1.1.128/25".parse()?, DataValue::from([("city", "Perth")]))?;
//!
//! let (network, value) = tree.get("1.1.1.200".parse()?)?;
//! assert_eq!(network.to_string(), "1.1.1.128/25");
//! assert_eq!(value.and_then(|v| v.get("city")), Some(&DataValue::from("Perth")));
//!
//! let bytes = tree.to_bytes()?;
//! let reader = mmdbforge::mmdb::Reader::from_bytes(bytes)?;
//! assert_eq!(reader.metadata().node_count, tree.finalize());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  1. Search tree (node records)       │
//! │  2. 16 zero bytes                    │
//! │  3. Data section (deduplicated)      │
//! │  4. "\xAB\xCD\xEFMaxMind.com"        │
//! │  5. Metadata map                     │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Reserved and Aliased Networks
//!
//! By default IANA special-purpose networks reject data, and in IPv6 trees
//! the IPv4-mapped, Teredo and 6to4 prefixes alias the IPv4 subtree at
//! `::/96`. Both are controlled through [`TreeOptions`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data_section;
pub mod data_writer;
pub mod dedup;
pub mod error;
pub mod inserter;
pub mod ip_tree_builder;
pub mod mmdb;
pub mod options;
pub mod range;
pub mod reserved;
pub mod source;

pub use crate::data_section::DataValue;
pub use crate::error::{Result, WritePhase, WriterError};
pub use crate::inserter::{inserter, MergeStrategy, Strategy};
pub use crate::ip_tree_builder::IpTreeBuilder;
pub use crate::mmdb::{IpVersion, RecordSize};
pub use crate::options::TreeOptions;
pub use crate::range::range_to_cidrs;
pub use crate::source::{SourceKey, SourceRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
