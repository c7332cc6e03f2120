#![no_main]
use ipnet::IpNet;
use libfuzzer_sys::fuzz_target;
use mmdbforge::mmdb::Reader;
use mmdbforge::{DataValue, IpTreeBuilder, IpVersion, TreeOptions};
use std::net::{IpAddr, Ipv4Addr};

fuzz_target!(|data: &[u8]| {
    let options = TreeOptions::new(IpVersion::V4)
        .with_reserved_networks(true)
        .with_build_epoch(0);
    let mut tree = IpTreeBuilder::new(options).unwrap();

    // Six bytes per insert: address, prefix length, value
    let mut addrs = Vec::new();
    for chunk in data.chunks_exact(6) {
        let addr = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let prefix = chunk[4] % 33;
        let network = IpNet::new(IpAddr::V4(Ipv4Addr::from(addr)), prefix).unwrap();
        tree.insert_value(network, DataValue::Uint32(u32::from(chunk[5] % 8)))
            .unwrap();
        addrs.push(addr);
    }

    let reader = Reader::from_bytes(tree.to_bytes().unwrap()).unwrap();
    for addr in addrs {
        let ip = IpAddr::V4(Ipv4Addr::from(addr));
        let (network, expected) = tree.get(ip).unwrap();
        let (read_network, value) = reader.lookup(ip).unwrap();
        assert_eq!(read_network, network);
        assert_eq!(value.as_ref(), expected);
    }
});
