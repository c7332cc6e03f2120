//! Tree build options
//!
//! Options are plain serde structs so the CLI can load them from a JSON
//! file; every field has a default.

use crate::error::{Result, WriterError};
use crate::mmdb::{IpVersion, RecordSize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration for an [`IpTreeBuilder`](crate::IpTreeBuilder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeOptions {
    /// 4 for a 32-bit tree, 6 for a 128-bit tree
    pub ip_version: IpVersion,
    /// Bits per node record
    pub record_size: RecordSize,
    /// Free-form `database_type` metadata value
    pub database_type: String,
    /// Language code to description
    pub description: BTreeMap<String, String>,
    /// Locale codes the data may contain
    pub languages: Vec<String>,
    /// Build timestamp in seconds; `None` uses the current time
    pub build_epoch: Option<u64>,
    /// Allow inserts into IANA special-purpose networks
    pub include_reserved_networks: bool,
    /// Do not alias IPv4-mapped, Teredo and 6to4 space to the IPv4 subtree
    pub disable_ipv4_aliasing: bool,
    /// Write the metadata map without pointer compression
    pub disable_metadata_pointers: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            ip_version: IpVersion::V6,
            record_size: RecordSize::Bits28,
            database_type: "mmdbforge".to_string(),
            description: BTreeMap::new(),
            languages: Vec::new(),
            build_epoch: None,
            include_reserved_networks: false,
            disable_ipv4_aliasing: false,
            disable_metadata_pointers: false,
        }
    }
}

impl TreeOptions {
    /// Defaults for a tree of the given IP version
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            ip_version,
            ..Self::default()
        }
    }

    /// Set the record size
    pub fn with_record_size(mut self, record_size: RecordSize) -> Self {
        self.record_size = record_size;
        self
    }

    /// Set the database type
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Add a description for a language
    pub fn with_description(
        mut self,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Add a supported language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.languages.push(language.into());
        self
    }

    /// Pin the build timestamp (reproducible builds)
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }

    /// Allow data in reserved networks
    pub fn with_reserved_networks(mut self, include: bool) -> Self {
        self.include_reserved_networks = include;
        self
    }

    /// Turn IPv4 aliasing off
    pub fn with_ipv4_aliasing(mut self, enabled: bool) -> Self {
        self.disable_ipv4_aliasing = !enabled;
        self
    }

    /// Turn pointer compression inside metadata off
    pub fn with_metadata_pointers(mut self, enabled: bool) -> Self {
        self.disable_metadata_pointers = !enabled;
        self
    }

    /// Parse options from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| WriterError::Config(format!("invalid tree options: {}", e)))
    }

    /// Load options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| WriterError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Build timestamp to write, resolving `None` to now
    pub fn resolved_build_epoch(&self) -> u64 {
        self.build_epoch.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }

    /// True when IPv4 space is aliased into an IPv6 tree
    pub fn aliases_ipv4(&self) -> bool {
        self.ip_version == IpVersion::V6 && !self.disable_ipv4_aliasing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = TreeOptions::default();
        assert_eq!(opts.ip_version, IpVersion::V6);
        assert_eq!(opts.record_size, RecordSize::Bits28);
        assert!(opts.aliases_ipv4());
        assert!(!opts.include_reserved_networks);
    }

    #[test]
    fn test_partial_json() {
        let opts = TreeOptions::from_json_str(
            r#"{"ip_version": 4, "record_size": 24, "description": {"en": "test"}}"#,
        )
        .unwrap();
        assert_eq!(opts.ip_version, IpVersion::V4);
        assert_eq!(opts.record_size, RecordSize::Bits24);
        assert_eq!(opts.description.get("en").map(String::as_str), Some("test"));
        assert!(!opts.aliases_ipv4());
        assert_eq!(opts.database_type, "mmdbforge");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TreeOptions::from_json_str(r#"{"record_size": 26}"#),
            Err(WriterError::Config(_))
        ));
        assert!(TreeOptions::from_json_str(r#"{"no_such_option": true}"#).is_err());
    }

    #[test]
    fn test_builder_methods() {
        let opts = TreeOptions::new(IpVersion::V6)
            .with_database_type("GeoIP2-City")
            .with_language("en")
            .with_build_epoch(42)
            .with_ipv4_aliasing(false);
        assert_eq!(opts.resolved_build_epoch(), 42);
        assert_eq!(opts.languages, vec!["en".to_string()]);
        assert!(!opts.aliases_ipv4());
    }
}
