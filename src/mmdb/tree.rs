//! Search tree traversal
//!
//! Each node holds two records (left for bit 0, right for bit 1). A record
//! is a node number, the node count itself ("no data"), or a data pointer
//! biased by the node count and the 16-byte separator.

use super::format::MmdbHeader;
use super::types::{IpVersion, MmdbError, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use ipnet::IpNet;
use std::net::{IpAddr, Ipv6Addr};

/// Decoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRecord {
    /// Continue at this node
    Node(u32),
    /// No data for this network
    Empty,
    /// Offset into the data section
    Data(u32),
}

/// Result of an IP lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// Offset into the data section, `None` when the covering record is empty
    pub data_offset: Option<u32>,
    /// Covering network
    ///
    /// In the family of the query, except for IPv4 queries in an IPv6 tree
    /// that stop above `::/96`, which get the IPv6 network.
    pub network: IpNet,
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    data: &'a [u8],
    header: &'a MmdbHeader,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Self {
        Self { data, header }
    }

    /// Look up an IP address
    ///
    /// IPv4 addresses in an IPv6 tree are looked up as `::a.b.c.d`.
    pub fn lookup(&self, ip: IpAddr) -> Result<LookupResult, MmdbError> {
        let (bits, depth, offset) = match (ip, self.header.ip_version) {
            (IpAddr::V4(addr), IpVersion::V4) => ((u32::from(addr) as u128) << 96, 32, 0),
            (IpAddr::V4(addr), IpVersion::V6) => (u32::from(addr) as u128, 128, 96),
            (IpAddr::V6(addr), IpVersion::V6) => (u128::from(addr), 128, 0),
            (IpAddr::V6(addr), IpVersion::V4) => {
                return Err(MmdbError::InvalidIpAddress(format!(
                    "cannot look up IPv6 address {} in an IPv4 database",
                    addr
                )))
            }
        };

        let (reached, record) = self.walk(bits, depth)?;
        let network = if reached >= offset {
            IpNet::new(ip, reached - offset)
        } else {
            IpNet::new(IpAddr::V6(Ipv6Addr::from(bits)), reached)
        }
        .map(|net| net.trunc())
        .map_err(|e| MmdbError::LookupError(e.to_string()))?;

        Ok(LookupResult {
            data_offset: match record {
                TreeRecord::Data(offset) => Some(offset),
                _ => None,
            },
            network,
        })
    }

    /// Follow left-aligned `bits` from the root until a non-node record
    fn walk(&self, bits: u128, max_depth: u8) -> Result<(u8, TreeRecord), MmdbError> {
        let mut node = 0u32;
        for depth in 0..max_depth {
            let bit = ((bits >> (127 - depth)) & 1) as u8;
            match self.record(node, bit)? {
                TreeRecord::Node(next) => node = next,
                other => return Ok((depth + 1, other)),
            }
        }
        Err(MmdbError::LookupError(format!(
            "tree is deeper than {} bits",
            max_depth
        )))
    }

    /// Read and classify one record of a node
    pub fn record(&self, node: u32, side: u8) -> Result<TreeRecord, MmdbError> {
        self.classify(self.read_record(node, side)?)
    }

    fn classify(&self, record: u32) -> Result<TreeRecord, MmdbError> {
        let node_count = self.header.node_count;
        if record < node_count {
            Ok(TreeRecord::Node(record))
        } else if record == node_count {
            Ok(TreeRecord::Empty)
        } else {
            record
                .checked_sub(node_count)
                .and_then(|r| r.checked_sub(DATA_SECTION_SEPARATOR_SIZE as u32))
                .map(TreeRecord::Data)
                .ok_or_else(|| {
                    MmdbError::InvalidFormat(format!(
                        "record {} points into the separator (node_count = {})",
                        record, node_count
                    ))
                })
        }
    }

    /// Raw record value; `side` 0 is the left record
    fn read_record(&self, node: u32, side: u8) -> Result<u32, MmdbError> {
        if node >= self.header.node_count {
            return Err(MmdbError::InvalidFormat(format!(
                "Node index {} exceeds node count {}",
                node, self.header.node_count
            )));
        }

        let node_bytes = self.header.record_size.node_bytes();
        let start = node as usize * node_bytes;
        let bytes = self
            .data
            .get(start..start + node_bytes)
            .filter(|_| start + node_bytes <= self.header.tree_size)
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!(
                    "Node offset {} exceeds tree size {}",
                    start, self.header.tree_size
                ))
            })?;

        let be24 = |b: &[u8]| (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;
        Ok(match (self.header.record_size, side) {
            (RecordSize::Bits24, 0) => be24(&bytes[0..3]),
            (RecordSize::Bits24, _) => be24(&bytes[3..6]),
            // Middle byte holds the high nibble of each record
            (RecordSize::Bits28, 0) => ((bytes[3] as u32 & 0xF0) << 20) | be24(&bytes[0..3]),
            (RecordSize::Bits28, _) => ((bytes[3] as u32 & 0x0F) << 24) | be24(&bytes[4..7]),
            (RecordSize::Bits32, 0) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (RecordSize::Bits32, _) => u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}
