//! Database reader
//!
//! Opens a finished database (memory-mapped or from bytes) to inspect its
//! metadata, look up addresses and walk every network. Used to verify
//! written files and to seed a builder from an existing database.

use super::format::{Metadata, MmdbHeader};
use super::tree::{SearchTree, TreeRecord};
use super::types::{IpVersion, MmdbError};
use crate::data_section::{DataDecoder, DataValue};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use memmap2::Mmap;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Storage for database data - either owned or memory-mapped
enum ReaderStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl ReaderStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            ReaderStorage::Owned(v) => v.as_slice(),
            ReaderStorage::Mmap(m) => &m[..],
        }
    }
}

/// Read-only view of a database file
pub struct Reader {
    data: ReaderStorage,
    header: MmdbHeader,
    metadata: Metadata,
}

impl Reader {
    /// Open a database file using memory mapping
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MmdbError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MmdbError::IoError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        // SAFETY: the map is read-only and the file is not modified while the
        // reader is alive.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            MmdbError::IoError(format!("Failed to mmap {}: {}", path.display(), e))
        })?;

        Self::from_storage(ReaderStorage::Mmap(mmap))
    }

    /// Create a reader over an in-memory database
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, MmdbError> {
        Self::from_storage(ReaderStorage::Owned(data))
    }

    fn from_storage(data: ReaderStorage) -> Result<Self, MmdbError> {
        let bytes = data.as_slice();
        let header = MmdbHeader::from_file(bytes)?;
        let metadata = Metadata::from_file(bytes)?;
        Ok(Reader {
            data,
            header,
            metadata,
        })
    }

    /// Decoded metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Covering network of `ip` and its value, if any
    pub fn lookup(&self, ip: IpAddr) -> Result<(IpNet, Option<DataValue>), MmdbError> {
        let tree = SearchTree::new(self.data.as_slice(), &self.header);
        let result = tree.lookup(ip)?;
        let value = result
            .data_offset
            .map(|offset| self.decode(offset))
            .transpose()?;
        Ok((result.network, value))
    }

    /// Iterate every network that carries data, in address order
    ///
    /// With `skip_aliased`, subtrees reachable through more than one path
    /// (the IPv4 aliases of an IPv6 database) are only reported once, under
    /// their first path.
    pub fn networks(&self, skip_aliased: bool) -> Networks<'_> {
        let mut stack = Vec::new();
        if self.header.node_count > 0 {
            stack.push(Pending {
                record: TreeRecord::Node(0),
                bits: 0,
                depth: 0,
            });
        }
        Networks {
            reader: self,
            stack,
            visited: FxHashSet::default(),
            skip_aliased,
        }
    }

    fn decode(&self, offset: u32) -> Result<DataValue, MmdbError> {
        let data = self.data.as_slice();
        let section = &data[self.header.data_section_start..self.header.metadata_marker];
        DataDecoder::new(section)
            .decode(offset as usize)
            .map_err(|e| MmdbError::DecodeError(format!("at data offset {}: {}", offset, e)))
    }

    fn to_network(&self, bits: u128, depth: u8) -> Result<IpNet, MmdbError> {
        let net = match self.header.ip_version {
            IpVersion::V4 => {
                IpNet::V4(Ipv4Net::new(Ipv4Addr::from((bits >> 96) as u32), depth).map_err(prefix_error)?)
            }
            IpVersion::V6 if depth >= 96 && bits >> 32 == 0 => {
                IpNet::V4(Ipv4Net::new(Ipv4Addr::from(bits as u32), depth - 96).map_err(prefix_error)?)
            }
            IpVersion::V6 => IpNet::V6(Ipv6Net::new(Ipv6Addr::from(bits), depth).map_err(prefix_error)?),
        };
        Ok(net)
    }
}

struct Pending {
    record: TreeRecord,
    bits: u128,
    depth: u8,
}

/// Iterator over `(network, value)` pairs of a database
pub struct Networks<'a> {
    reader: &'a Reader,
    stack: Vec<Pending>,
    visited: FxHashSet<u32>,
    skip_aliased: bool,
}

impl Iterator for Networks<'_> {
    type Item = Result<(IpNet, DataValue), MmdbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bit_count = self.reader.header.ip_version.bit_count();
        let tree = SearchTree::new(self.reader.data.as_slice(), &self.reader.header);

        while let Some(Pending { record, bits, depth }) = self.stack.pop() {
            match record {
                TreeRecord::Empty => {}
                TreeRecord::Data(offset) => {
                    let item = self
                        .reader
                        .to_network(bits, depth)
                        .and_then(|net| Ok((net, self.reader.decode(offset)?)));
                    return Some(item);
                }
                TreeRecord::Node(node) => {
                    if self.skip_aliased && !self.visited.insert(node) {
                        continue;
                    }
                    if depth >= bit_count {
                        return Some(Err(MmdbError::InvalidFormat(format!(
                            "node {} below the maximum depth",
                            node
                        ))));
                    }
                    let right = match tree.record(node, 1) {
                        Ok(r) => r,
                        Err(e) => return Some(Err(e)),
                    };
                    let left = match tree.record(node, 0) {
                        Ok(r) => r,
                        Err(e) => return Some(Err(e)),
                    };
                    self.stack.push(Pending {
                        record: right,
                        bits: bits | (1u128 << (127 - depth)),
                        depth: depth + 1,
                    });
                    self.stack.push(Pending {
                        record: left,
                        bits,
                        depth: depth + 1,
                    });
                }
            }
        }
        None
    }
}

fn prefix_error(e: ipnet::PrefixLenError) -> MmdbError {
    MmdbError::LookupError(e.to_string())
}
