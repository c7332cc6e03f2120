//! IP Tree Builder for MMDB Format
//!
//! Builds the binary search tree of a MaxMind DB file. Every node has two
//! records, one per value of the next address bit. Inserting a network walks
//! its prefix bits from the root, splitting leaf records on the way down and
//! merging identical siblings on the way back up, so the tree is always in
//! its most compact form.
//!
//! Nodes live in an arena and are numbered in pre-order by [`finalize`],
//! which is also the order [`write_to`] emits them in.
//!
//! [`finalize`]: IpTreeBuilder::finalize
//! [`write_to`]: IpTreeBuilder::write_to

use crate::data_section::{ContentKey, DataValue};
use crate::data_writer::DataWriter;
use crate::dedup::DedupStore;
use crate::error::{Result, WritePhase, WriterError};
use crate::inserter::{inserter, MergeStrategy, Strategy};
use crate::mmdb::{
    IpVersion, Metadata, Reader, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER,
};
use crate::options::TreeOptions;
use crate::range::range_to_cidrs;
use crate::reserved::{alias_networks, reserved_networks, IPV4_SUBTREE};
use crate::source::{SourceKey, SourceRecord};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use log::{debug, trace};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Index of a node in the arena
pub type NodeId = u32;

const ROOT: NodeId = 0;
const UNNUMBERED: u32 = u32::MAX;

/// Merge function applied at every record an insert covers
type MergeFn<'f> = dyn FnMut(Option<&DataValue>) -> Result<Option<DataValue>> + 'f;

/// One half of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    /// No data
    Empty,
    /// Value stored in the dedup store under this key
    Data(ContentKey),
    /// Subtree
    Node(NodeId),
    /// Another path into a subtree owned elsewhere
    Alias(NodeId),
    /// Subtree that is never merged away (the IPv4 root)
    FixedNode(NodeId),
    /// Network that may not hold data
    Reserved,
}

#[derive(Debug, Clone)]
struct Node {
    children: [Record; 2],
}

impl Node {
    fn new_empty() -> Self {
        Self {
            children: [Record::Empty; 2],
        }
    }
}

/// What an insert writes into the records it reaches
enum Target<'f> {
    Data(&'f mut MergeFn<'f>),
    Reserved,
    Alias(NodeId),
    FixedNode(NodeId),
}

struct InsertJob<'f> {
    /// Network as given by the caller, for error messages
    network: IpNet,
    /// Left-aligned address bits in tree coordinates
    bits: u128,
    /// Prefix length in tree coordinates
    prefix_len: u8,
    target: Target<'f>,
}

/// Pre-order node numbers, indexed by arena id
#[derive(Debug, Clone)]
struct Numbering {
    ids: Vec<u32>,
    count: u32,
}

/// IP tree builder using arena allocation
#[derive(Debug)]
pub struct IpTreeBuilder {
    /// All nodes in the tree (arena); index 0 is the root
    nodes: Vec<Node>,
    /// Arena slots released by merges
    free: Vec<NodeId>,
    /// Distinct values referenced by data records
    dedup: DedupStore,
    options: TreeOptions,
    /// Valid until the next mutation
    numbering: Option<Numbering>,
}

impl IpTreeBuilder {
    /// Create a tree, planting IPv4 aliases and reserved networks as configured
    pub fn new(options: TreeOptions) -> Result<Self> {
        let mut tree = Self {
            nodes: vec![Node::new_empty()],
            free: Vec::new(),
            dedup: DedupStore::new(),
            options,
            numbering: None,
        };

        if tree.options.aliases_ipv4() {
            let ipv4_root = tree.allocate_node([Record::Empty; 2]);
            let subtree: IpNet = IPV4_SUBTREE
                .parse()
                .map_err(|e: ipnet::AddrParseError| WriterError::internal(e.to_string()))?;
            tree.run(subtree, Target::FixedNode(ipv4_root))?;
            for alias in alias_networks() {
                tree.run(alias, Target::Alias(ipv4_root))?;
            }
        }

        if !tree.options.include_reserved_networks {
            for network in reserved_networks(tree.options.ip_version) {
                tree.run(network, Target::Reserved)?;
            }
        }

        debug!(
            "Created IPv{} tree: {}-bit records, aliasing {}, reserved networks {}",
            tree.options.ip_version.number(),
            tree.options.record_size.bits(),
            if tree.options.aliases_ipv4() { "on" } else { "off" },
            if tree.options.include_reserved_networks {
                "allowed"
            } else {
                "blocked"
            },
        );
        Ok(tree)
    }

    /// Build options of this tree
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Insert `network`, computing each covered record's new value with `merge`
    ///
    /// `merge` receives the current value (or `None`) and returns the value to
    /// store; `None` clears the record. It runs once for every leaf record
    /// inside the network, so it may run several times per insert.
    pub fn insert<F>(&mut self, network: IpNet, mut merge: F) -> Result<()>
    where
        F: FnMut(Option<&DataValue>) -> Result<Option<DataValue>>,
    {
        trace!("Inserting {}", network);
        self.run(network, Target::Data(&mut merge))
    }

    /// Insert `value` at `network`, replacing what is there
    pub fn insert_value(&mut self, network: IpNet, value: DataValue) -> Result<()> {
        self.insert_with(network, &Strategy::Replace, value)
    }

    /// Insert `value` at `network`, combined with existing data by `strategy`
    pub fn insert_with<S>(&mut self, network: IpNet, strategy: &S, value: DataValue) -> Result<()>
    where
        S: MergeStrategy + ?Sized,
    {
        self.insert(network, inserter(strategy, value))
    }

    /// Insert every network of the range `[start, end]`
    pub fn insert_range<F>(&mut self, start: IpAddr, end: IpAddr, mut merge: F) -> Result<()>
    where
        F: FnMut(Option<&DataValue>) -> Result<Option<DataValue>>,
    {
        let networks = range_to_cidrs(start, end)?;
        trace!("Range {}-{} covers {} networks", start, end, networks.len());
        for network in networks {
            self.run(network, Target::Data(&mut merge))?;
        }
        Ok(())
    }

    /// Insert `value` over the range `[start, end]` using `strategy`
    pub fn insert_range_with<S>(
        &mut self,
        start: IpAddr,
        end: IpAddr,
        strategy: &S,
        value: DataValue,
    ) -> Result<()>
    where
        S: MergeStrategy + ?Sized,
    {
        self.insert_range(start, end, inserter(strategy, value))
    }

    /// Clear all data inside `network`
    pub fn remove(&mut self, network: IpNet) -> Result<()> {
        self.insert(network, |_| Ok(None))
    }

    /// Insert every record from a source, returning how many were applied
    pub fn extend_from<I, S>(&mut self, records: I, strategy: &S) -> Result<usize>
    where
        I: IntoIterator<Item = Result<SourceRecord>>,
        S: MergeStrategy + ?Sized,
    {
        let mut count = 0;
        for record in records {
            let SourceRecord { key, value } = record?;
            match key {
                SourceKey::Network(network) => self.insert_with(network, strategy, value)?,
                SourceKey::Range(start, end) => {
                    self.insert_range_with(start, end, strategy, value)?
                }
            }
            count += 1;
        }
        debug!("Inserted {} source records", count);
        Ok(count)
    }

    /// Seed a new tree with every network of an existing database
    ///
    /// Aliased subtrees are read once, through the IPv4 subtree.
    pub fn from_reader(reader: &Reader, options: TreeOptions) -> Result<Self> {
        let mut tree = Self::new(options)?;
        let mut count = 0usize;
        for item in reader.networks(true) {
            let (network, value) = item?;
            tree.insert_value(network, value)?;
            count += 1;
        }
        debug!("Seeded tree with {} networks from existing database", count);
        Ok(tree)
    }

    /// Covering network of `ip` and its value, if any
    pub fn get(&self, ip: IpAddr) -> Result<(IpNet, Option<&DataValue>)> {
        let ipv4_query = ip.is_ipv4();
        let (bits, _) = self.tree_bits(ip, 0)?;
        let mut node = ROOT;
        for depth in 0..self.options.ip_version.bit_count() {
            match self.nodes[node as usize].children[bit_at(bits, depth)] {
                Record::Node(n) | Record::FixedNode(n) | Record::Alias(n) => node = n,
                Record::Data(key) => {
                    let network = self.network_at(bits, depth + 1, ipv4_query)?;
                    return Ok((network, self.dedup.get(key)));
                }
                Record::Empty | Record::Reserved => {
                    return Ok((self.network_at(bits, depth + 1, ipv4_query)?, None));
                }
            }
        }
        Err(WriterError::internal(format!(
            "no leaf record on the path of {}",
            ip
        )))
    }

    /// Number the nodes in write order, returning the node count
    ///
    /// Cached until the next mutation.
    pub fn finalize(&mut self) -> u32 {
        if let Some(numbering) = &self.numbering {
            return numbering.count;
        }

        let mut ids = vec![UNNUMBERED; self.nodes.len()];
        let mut next = 0u32;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            ids[id as usize] = next;
            next += 1;
            for child in self.nodes[id as usize].children.iter().rev() {
                if let Record::Node(c) | Record::FixedNode(c) = child {
                    stack.push(*c);
                }
            }
        }

        debug!(
            "Finalized tree: {} nodes ({} arena slots, {} free)",
            next,
            self.nodes.len(),
            self.free.len()
        );
        self.numbering = Some(Numbering { ids, count: next });
        next
    }

    /// Number of nodes that will be written
    pub fn node_count(&mut self) -> usize {
        self.finalize() as usize
    }

    /// Number of distinct values referenced by the tree
    pub fn data_entries(&self) -> usize {
        self.dedup.len()
    }

    /// Serialize the database to `writer`, returning the number of bytes written
    ///
    /// Sections are already encoded in memory; each one is written and
    /// flushed before the next, so an I/O error names the section it hit.
    pub fn write_to<W: Write>(&mut self, mut writer: W) -> Result<u64> {
        self.finalize();
        let numbering = self
            .numbering
            .as_ref()
            .ok_or_else(|| WriterError::internal("tree was not finalized"))?;

        let (node_section, data_section) = self.encode_tree(numbering)?;
        let metadata = self.encode_metadata(numbering.count)?;

        writer
            .write_all(&node_section)
            .and_then(|_| writer.flush())
            .map_err(|e| WriterError::io(WritePhase::NodeSection, e))?;
        writer
            .write_all(&[0u8; DATA_SECTION_SEPARATOR_SIZE])
            .and_then(|_| writer.write_all(&data_section))
            .and_then(|_| writer.flush())
            .map_err(|e| WriterError::io(WritePhase::DataSection, e))?;
        writer
            .write_all(METADATA_MARKER)
            .and_then(|_| writer.write_all(&metadata))
            .and_then(|_| writer.flush())
            .map_err(|e| WriterError::io(WritePhase::MetadataSection, e))?;

        let total = node_section.len()
            + DATA_SECTION_SEPARATOR_SIZE
            + data_section.len()
            + METADATA_MARKER.len()
            + metadata.len();
        debug!(
            "Wrote database: {} nodes, {} bytes of data, {} bytes total",
            numbering.count,
            data_section.len(),
            total
        );
        Ok(total as u64)
    }

    /// Serialize the database into memory
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    fn run(&mut self, network: IpNet, target: Target<'_>) -> Result<()> {
        let network = network.trunc();
        let (bits, prefix_len) = self.tree_bits(network.network(), network.prefix_len())?;
        self.numbering = None;
        let mut job = InsertJob {
            network,
            bits,
            prefix_len,
            target,
        };
        self.insert_into_node(ROOT, 0, &mut job)
    }

    fn insert_into_node(&mut self, node: NodeId, depth: u8, job: &mut InsertJob<'_>) -> Result<()> {
        let new_depth = depth + 1;
        if new_depth > job.prefix_len {
            // Already inside the network: both halves are covered
            self.insert_into_record(node, 0, new_depth, job)?;
            return self.insert_into_record(node, 1, new_depth, job);
        }
        self.insert_into_record(node, bit_at(job.bits, depth), new_depth, job)
    }

    fn insert_into_record(
        &mut self,
        node: NodeId,
        side: usize,
        new_depth: u8,
        job: &mut InsertJob<'_>,
    ) -> Result<()> {
        let record = self.nodes[node as usize].children[side];
        match record {
            Record::Node(child) | Record::FixedNode(child) => {
                self.insert_into_node(child, new_depth, job)?;
                self.maybe_merge(node, side);
                Ok(())
            }
            Record::Empty | Record::Data(_) => {
                if new_depth >= job.prefix_len {
                    return self.apply(node, side, job);
                }
                let child = self.allocate_node([record, record]);
                if let Record::Data(key) = record {
                    self.dedup.retain(key);
                }
                self.nodes[node as usize].children[side] = Record::Node(child);
                self.insert_into_node(child, new_depth, job)?;
                self.maybe_merge(node, side);
                Ok(())
            }
            Record::Reserved => {
                if matches!(job.target, Target::Reserved) {
                    return Ok(());
                }
                if job.prefix_len >= new_depth {
                    return Err(WriterError::ReservedNetwork {
                        inserted: job.network,
                        reserved: self.network_at(job.bits, new_depth, job.network.addr().is_ipv4())?,
                    });
                }
                self.nodes[node as usize].children[side] = Record::Empty;
                self.apply(node, side, job)
            }
            Record::Alias(_) => {
                if job.prefix_len < new_depth {
                    return Ok(());
                }
                Err(WriterError::AliasedNetwork {
                    inserted: job.network,
                    alias: self.network_at(job.bits, new_depth, false)?,
                })
            }
        }
    }

    /// Write the job's target into a leaf record
    fn apply(&mut self, node: NodeId, side: usize, job: &mut InsertJob<'_>) -> Result<()> {
        let current = self.nodes[node as usize].children[side];
        let old_key = match current {
            Record::Data(key) => Some(key),
            _ => None,
        };

        let replacement = match &mut job.target {
            Target::Reserved => Record::Reserved,
            Target::Alias(n) => Record::Alias(*n),
            Target::FixedNode(n) => Record::FixedNode(*n),
            Target::Data(merge) => {
                let old = old_key.and_then(|key| self.dedup.get(key));
                match (*merge)(old)? {
                    None => Record::Empty,
                    Some(value) => {
                        let key = value.content_key()?;
                        if Some(key) == old_key {
                            return Ok(());
                        }
                        self.dedup.store(key, value);
                        Record::Data(key)
                    }
                }
            }
        };

        if let Some(key) = old_key {
            self.dedup.release(key);
        }
        self.nodes[node as usize].children[side] = replacement;
        Ok(())
    }

    /// Collapse the child of `node` at `side` when both its records are equal leaves
    fn maybe_merge(&mut self, node: NodeId, side: usize) {
        let child = match self.nodes[node as usize].children[side] {
            Record::Node(child) => child,
            _ => return,
        };
        let merged = match self.nodes[child as usize].children {
            [Record::Empty, Record::Empty] => Record::Empty,
            [Record::Reserved, Record::Reserved] => Record::Reserved,
            [Record::Data(a), Record::Data(b)] if a == b => {
                self.dedup.release(b);
                Record::Data(a)
            }
            _ => return,
        };
        self.nodes[node as usize].children[side] = merged;
        self.free_node(child);
    }

    fn allocate_node(&mut self, children: [Record; 2]) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id as usize].children = children;
                id
            }
            None => {
                let id = self.nodes.len() as NodeId;
                self.nodes.push(Node { children });
                id
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id as usize] = Node::new_empty();
        self.free.push(id);
    }

    /// Left-aligned bits and prefix length of an address in tree coordinates
    fn tree_bits(&self, ip: IpAddr, prefix_len: u8) -> Result<(u128, u8)> {
        match (ip, self.options.ip_version) {
            (IpAddr::V4(addr), IpVersion::V4) => Ok(((u32::from(addr) as u128) << 96, prefix_len)),
            // IPv4 lives at ::a.b.c.d in an IPv6 tree
            (IpAddr::V4(addr), IpVersion::V6) => Ok((u32::from(addr) as u128, prefix_len + 96)),
            (IpAddr::V6(addr), IpVersion::V6) => Ok((u128::from(addr), prefix_len)),
            (IpAddr::V6(addr), IpVersion::V4) => Err(WriterError::invalid_network(format!(
                "cannot insert or look up IPv6 address {} in an IPv4 tree",
                addr
            ))),
        }
    }

    /// Network of the record at `depth` on the path of `bits`
    fn network_at(&self, bits: u128, depth: u8, ipv4_query: bool) -> Result<IpNet> {
        let masked = if depth == 0 {
            0
        } else {
            bits & (u128::MAX << (128 - depth as u32))
        };
        let network = match self.options.ip_version {
            IpVersion::V4 => {
                Ipv4Net::new(Ipv4Addr::from((masked >> 96) as u32), depth).map(IpNet::V4)
            }
            IpVersion::V6 if ipv4_query && depth >= 96 => {
                Ipv4Net::new(Ipv4Addr::from(masked as u32), depth - 96).map(IpNet::V4)
            }
            IpVersion::V6 => Ipv6Net::new(Ipv6Addr::from(masked), depth).map(IpNet::V6),
        };
        network.map_err(|e| WriterError::internal(e.to_string()))
    }

    /// Node section bytes and data section bytes
    fn encode_tree(&self, numbering: &Numbering) -> Result<(Vec<u8>, Vec<u8>)> {
        let record_size = self.options.record_size;
        let mut node_section =
            Vec::with_capacity(numbering.count as usize * record_size.node_bytes());
        let mut data = DataWriter::new(true);

        let mut written = 0u32;
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if numbering.ids[id as usize] != written {
                return Err(WriterError::internal(format!(
                    "node {} written at position {} but numbered {}",
                    id, written, numbering.ids[id as usize]
                )));
            }
            let [left, right] = self.nodes[id as usize].children;
            let left_value = self.record_value(left, numbering, &mut data)?;
            let right_value = self.record_value(right, numbering, &mut data)?;
            encode_node(record_size, left_value, right_value, &mut node_section);
            written += 1;

            for child in [right, left] {
                if let Record::Node(c) | Record::FixedNode(c) = child {
                    stack.push(c);
                }
            }
        }

        if written != numbering.count {
            return Err(WriterError::internal(format!(
                "wrote {} nodes but finalized {}",
                written, numbering.count
            )));
        }
        Ok((node_section, data.into_bytes()))
    }

    fn record_value(
        &self,
        record: Record,
        numbering: &Numbering,
        data: &mut DataWriter,
    ) -> Result<u32> {
        let node_count = numbering.count as u64;
        let value = match record {
            Record::Empty | Record::Reserved => node_count,
            Record::Node(n) | Record::FixedNode(n) | Record::Alias(n) => {
                match numbering.ids.get(n as usize) {
                    Some(&id) if id != UNNUMBERED => id as u64,
                    _ => {
                        return Err(WriterError::internal(format!(
                            "record points at unnumbered node {}",
                            n
                        )))
                    }
                }
            }
            Record::Data(key) => {
                let value = self.dedup.get(key).ok_or_else(|| {
                    WriterError::internal(format!("data record with unknown key {:032x}", key))
                })?;
                let offset = data.write_record_value(key, value)?;
                node_count + DATA_SECTION_SEPARATOR_SIZE as u64 + offset as u64
            }
        };

        let record_size = self.options.record_size;
        if value > record_size.max_value() {
            return Err(WriterError::Capacity {
                value,
                record_size: record_size.bits(),
            });
        }
        Ok(value as u32)
    }

    fn encode_metadata(&self, node_count: u32) -> Result<Vec<u8>> {
        let metadata = Metadata {
            binary_format_major_version: 2,
            binary_format_minor_version: 0,
            build_epoch: self.options.resolved_build_epoch(),
            database_type: self.options.database_type.clone(),
            description: self.options.description.clone(),
            ip_version: self.options.ip_version,
            languages: self.options.languages.clone(),
            node_count,
            record_size: self.options.record_size,
        };
        let mut writer = DataWriter::new(!self.options.disable_metadata_pointers);
        writer.write_or_point(&metadata.to_value())?;
        Ok(writer.into_bytes())
    }
}

fn bit_at(bits: u128, depth: u8) -> usize {
    ((bits >> (127 - depth as u32)) & 1) as usize
}

/// Append one node; values must already fit the record size
fn encode_node(record_size: RecordSize, left: u32, right: u32, out: &mut Vec<u8>) {
    match record_size {
        RecordSize::Bits24 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits28 => {
            // Middle byte: left high 4 bits in upper nibble, right high 4 bits in lower nibble
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.push((((left >> 24) & 0x0F) << 4 | ((right >> 24) & 0x0F)) as u8);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        RecordSize::Bits32 => {
            out.extend_from_slice(&left.to_be_bytes());
            out.extend_from_slice(&right.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_v4() -> IpTreeBuilder {
        IpTreeBuilder::new(
            TreeOptions::new(IpVersion::V4)
                .with_record_size(RecordSize::Bits24)
                .with_reserved_networks(true),
        )
        .unwrap()
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    /// Sink that accepts `budget` bytes, then fails
    struct FailAfter {
        budget: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_tree_is_one_node() {
        let mut tree = plain_v4();
        assert_eq!(tree.finalize(), 1);
        let bytes = tree.to_bytes().unwrap();
        // Both records hold node_count (1) as the "no data" marker
        assert_eq!(&bytes[..6], &[0, 0, 1, 0, 0, 1]);
        assert_eq!(&bytes[6..22], &[0u8; 16]);
        assert_eq!(&bytes[22..22 + METADATA_MARKER.len()], METADATA_MARKER);
    }

    #[test]
    fn test_write_errors_name_their_section() {
        let mut tree = plain_v4();
        tree.insert_value(net("1.0.0.0/24"), DataValue::from("x"))
            .unwrap();
        let bytes = tree.to_bytes().unwrap();
        let node_bytes = tree.node_count() * RecordSize::Bits24.node_bytes();
        let marker = crate::mmdb::find_metadata_marker(&bytes).unwrap();

        let cases = [
            (0, WritePhase::NodeSection),
            (node_bytes - 1, WritePhase::NodeSection),
            (node_bytes + 4, WritePhase::DataSection),
            (marker - 1, WritePhase::DataSection),
            (marker + 2, WritePhase::MetadataSection),
            (bytes.len() - 1, WritePhase::MetadataSection),
        ];
        for (budget, expected) in cases {
            match tree.write_to(FailAfter { budget }) {
                Err(WriterError::Io { phase, .. }) => assert_eq!(phase, expected, "{}", budget),
                other => panic!("budget {}: expected I/O error, got {:?}", budget, other),
            }
        }
        assert_eq!(
            tree.write_to(FailAfter { budget: bytes.len() }).unwrap(),
            bytes.len() as u64
        );
    }

    #[test]
    fn test_split_and_merge_reuses_nodes() {
        let mut tree = plain_v4();
        let value = DataValue::from("x");
        tree.insert_value(net("10.0.0.0/25"), value.clone()).unwrap();
        let arena = tree.nodes.len();
        tree.insert_value(net("10.0.0.128/25"), value.clone()).unwrap();

        // The /25 siblings collapsed back into a single /24 path
        assert_eq!(tree.finalize(), 24);
        assert_eq!(tree.nodes.len(), arena);
        assert_eq!(tree.free.len(), 1);
        assert_eq!(tree.dedup.refs(value.content_key().unwrap()), 1);

        tree.insert_value(net("192.168.0.0/16"), DataValue::from("y"))
            .unwrap();
        // First allocation comes from the free list
        assert!(tree.free.is_empty());
    }

    #[test]
    fn test_overwrite_releases_old_value() {
        let mut tree = plain_v4();
        tree.insert_value(net("1.0.0.0/8"), DataValue::from("a")).unwrap();
        assert_eq!(tree.data_entries(), 1);
        tree.insert_value(net("1.0.0.0/8"), DataValue::from("b")).unwrap();
        assert_eq!(tree.data_entries(), 1);
        tree.remove(net("1.0.0.0/8")).unwrap();
        assert_eq!(tree.data_entries(), 0);
        assert_eq!(tree.finalize(), 1);
    }

    #[test]
    fn test_split_takes_extra_reference() {
        let mut tree = plain_v4();
        let value = DataValue::from("wide");
        let key = value.content_key().unwrap();
        tree.insert_value(net("8.0.0.0/8"), value).unwrap();
        tree.insert_value(net("8.8.8.0/24"), DataValue::from("narrow"))
            .unwrap();
        // One record at each level from /9 to /24 still holds the /8 value
        assert_eq!(tree.dedup.refs(key), 16);
    }

    #[test]
    fn test_numbering_invalidated_by_insert() {
        let mut tree = plain_v4();
        assert_eq!(tree.finalize(), 1);
        tree.insert_value(net("128.0.0.0/1"), DataValue::Bool(true))
            .unwrap();
        assert!(tree.numbering.is_none());
        assert_eq!(tree.finalize(), 1);
        tree.insert_value(net("0.0.0.0/2"), DataValue::Bool(true))
            .unwrap();
        assert_eq!(tree.finalize(), 2);
    }

    #[test]
    fn test_pre_order_numbering() {
        let mut tree = plain_v4();
        tree.insert_value(net("0.0.0.0/2"), DataValue::from("a")).unwrap();
        tree.insert_value(net("128.0.0.0/2"), DataValue::from("b")).unwrap();
        assert_eq!(tree.finalize(), 3);

        let numbering = tree.numbering.clone().unwrap();
        let [left, right] = tree.nodes[ROOT as usize].children;
        match (left, right) {
            (Record::Node(l), Record::Node(r)) => {
                assert_eq!(numbering.ids[ROOT as usize], 0);
                assert_eq!(numbering.ids[l as usize], 1);
                assert_eq!(numbering.ids[r as usize], 2);
            }
            other => panic!("unexpected root records {:?}", other),
        }
    }

    #[test]
    fn test_encode_node_layouts() {
        let mut out = Vec::new();
        encode_node(RecordSize::Bits28, 0x1000001, 0x2000002, &mut out);
        assert_eq!(out, vec![0x00, 0x00, 0x01, 0x12, 0x00, 0x00, 0x02]);

        out.clear();
        encode_node(RecordSize::Bits24, 0xABCDEF, 1, &mut out);
        assert_eq!(out, vec![0xAB, 0xCD, 0xEF, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_ipv6_in_ipv4_tree_fails() {
        let mut tree = plain_v4();
        let err = tree
            .insert_value(net("2001:db8::/32"), DataValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, WriterError::InvalidNetwork(_)));
        assert!(tree.get("::1".parse().unwrap()).is_err());
    }

    #[test]
    fn test_aliases_share_ipv4_subtree() {
        let tree = IpTreeBuilder::new(TreeOptions::default().with_reserved_networks(true))
            .unwrap();
        let (_, mapped) = tree.get("::ffff:1.2.3.4".parse().unwrap()).unwrap();
        assert!(mapped.is_none());

        let mut tree = tree;
        tree.insert_value(net("1.2.3.0/24"), DataValue::from("v4"))
            .unwrap();
        let (network, value) = tree.get("::ffff:1.2.3.4".parse().unwrap()).unwrap();
        assert_eq!(value, Some(&DataValue::from("v4")));
        assert_eq!(network, net("::ffff:102:300/120"));

        // 6to4 embeds the IPv4 address right after the /16
        let (_, value) = tree.get("2002:102:304::1".parse().unwrap()).unwrap();
        assert_eq!(value, Some(&DataValue::from("v4")));
    }
}
