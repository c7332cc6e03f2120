// Insert, merge, reserved and alias behavior of the tree builder

use ipnet::IpNet;
use mmdbforge::{DataValue, IpTreeBuilder, IpVersion, Strategy, TreeOptions, WriterError};
use std::net::IpAddr;

fn net(s: &str) -> IpNet {
    s.parse().unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn city(name: &str) -> DataValue {
    DataValue::from([("city", name)])
}

fn v4_tree() -> IpTreeBuilder {
    IpTreeBuilder::new(TreeOptions::new(IpVersion::V4).with_build_epoch(1)).unwrap()
}

#[test]
fn test_more_specific_network_splits_broader_one() {
    let options = TreeOptions::default()
        .with_reserved_networks(true)
        .with_build_epoch(1);
    let mut tree = IpTreeBuilder::new(options).unwrap();

    tree.insert_value(net("192.168.1.0/24"), city("X")).unwrap();
    tree.insert_value(net("192.168.1.128/25"), city("Y")).unwrap();

    let (network, value) = tree.get(ip("192.168.1.5")).unwrap();
    assert_eq!(network, net("192.168.1.0/25"));
    assert_eq!(value, Some(&city("X")));

    let (network, value) = tree.get(ip("192.168.1.200")).unwrap();
    assert_eq!(network, net("192.168.1.128/25"));
    assert_eq!(value, Some(&city("Y")));

    assert_eq!(tree.get(ip("192.168.2.1")).unwrap().1, None);
}

#[test]
fn test_specific_before_broader_is_overwritten() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.2.3.4/32"), city("host")).unwrap();
    tree.insert_value(net("1.2.3.0/24"), city("subnet")).unwrap();

    // Replace applies to every record the broader network covers
    assert_eq!(tree.get(ip("1.2.3.4")).unwrap().1, Some(&city("subnet")));
    assert_eq!(tree.data_entries(), 1);
}

#[test]
fn test_reserved_network_rejected_ipv4() {
    let mut tree = v4_tree();
    let err = tree
        .insert_value(net("127.0.0.1/32"), city("loopback"))
        .unwrap_err();
    match err {
        WriterError::ReservedNetwork { inserted, reserved } => {
            assert_eq!(inserted, net("127.0.0.1/32"));
            assert_eq!(reserved, net("127.0.0.0/8"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_reserved_network_rejected_ipv6_tree() {
    let mut tree = IpTreeBuilder::new(TreeOptions::default()).unwrap();
    let err = tree
        .insert_value(net("127.0.0.1/32"), city("loopback"))
        .unwrap_err();
    assert!(err.to_string().contains("127.0.0.0/8"), "{}", err);

    let err = tree
        .insert_value(net("fe80::1/128"), city("link-local"))
        .unwrap_err();
    assert!(matches!(err, WriterError::ReservedNetwork { .. }));
}

#[test]
fn test_reserved_networks_allowed_when_included() {
    let options = TreeOptions::new(IpVersion::V4).with_reserved_networks(true);
    let mut tree = IpTreeBuilder::new(options).unwrap();
    tree.insert_value(net("10.0.0.0/8"), city("lan")).unwrap();
    assert_eq!(tree.get(ip("10.1.2.3")).unwrap().1, Some(&city("lan")));
}

#[test]
fn test_broader_insert_covers_reserved_space() {
    let mut tree = v4_tree();
    tree.insert_value(net("0.0.0.0/0"), city("world")).unwrap();
    assert_eq!(tree.get(ip("10.1.1.1")).unwrap().1, Some(&city("world")));
    assert_eq!(tree.get(ip("8.8.8.8")).unwrap().1, Some(&city("world")));
}

#[test]
fn test_aliased_network_rejected() {
    let mut tree = IpTreeBuilder::new(TreeOptions::default()).unwrap();
    let err = tree
        .insert_value(net("::ffff:1.2.3.4/128"), city("mapped"))
        .unwrap_err();
    match err {
        WriterError::AliasedNetwork { alias, .. } => assert_eq!(alias, net("::ffff:0:0/96")),
        other => panic!("unexpected error: {}", other),
    }
    assert!(matches!(
        tree.insert_value(net("2002:102:304::/48"), city("6to4")),
        Err(WriterError::AliasedNetwork { .. })
    ));
}

#[test]
fn test_aliases_follow_ipv4_data() {
    let mut tree = IpTreeBuilder::new(TreeOptions::default()).unwrap();
    tree.insert_value(net("1.2.3.0/24"), city("v4")).unwrap();

    for query in ["1.2.3.9", "::ffff:1.2.3.9", "2002:102:309::1", "2001:0:102:309::"] {
        assert_eq!(tree.get(ip(query)).unwrap().1, Some(&city("v4")), "{}", query);
    }
}

#[test]
fn test_broader_insert_skips_aliases() {
    let mut tree = IpTreeBuilder::new(TreeOptions::default()).unwrap();
    tree.insert_value(net("::/0"), city("everywhere")).unwrap();

    assert_eq!(tree.get(ip("2600::1")).unwrap().1, Some(&city("everywhere")));
    assert_eq!(tree.get(ip("1.1.1.1")).unwrap().1, Some(&city("everywhere")));
    // Still an alias, so still reaches the IPv4 subtree
    assert_eq!(
        tree.get(ip("::ffff:1.1.1.1")).unwrap().1,
        Some(&city("everywhere"))
    );
    assert!(tree
        .insert_value(net("::ffff:0:0/96"), city("mapped"))
        .is_err());
}

#[test]
fn test_aliasing_disabled() {
    let options = TreeOptions::default().with_ipv4_aliasing(false);
    let mut tree = IpTreeBuilder::new(options).unwrap();
    tree.insert_value(net("::ffff:1.2.3.4/128"), city("mapped"))
        .unwrap();
    assert_eq!(tree.get(ip("1.2.3.4")).unwrap().1, None);
}

#[test]
fn test_ipv6_rejected_in_ipv4_tree() {
    let mut tree = v4_tree();
    assert!(matches!(
        tree.insert_value(net("2600::/32"), city("v6")),
        Err(WriterError::InvalidNetwork(_))
    ));
    assert!(tree.get(ip("2600::1")).is_err());
}

#[test]
fn test_adjacent_halves_compact_like_whole() {
    let mut halves = v4_tree();
    halves.insert_value(net("11.0.0.0/25"), city("A")).unwrap();
    halves.insert_value(net("11.0.0.128/25"), city("A")).unwrap();

    let mut whole = v4_tree();
    whole.insert_value(net("11.0.0.0/24"), city("A")).unwrap();

    assert_eq!(halves.node_count(), whole.node_count());
    assert_eq!(halves.to_bytes().unwrap(), whole.to_bytes().unwrap());
    assert_eq!(halves.get(ip("11.0.0.7")).unwrap().0, net("11.0.0.0/24"));
}

#[test]
fn test_reinsert_is_idempotent() {
    let mut once = v4_tree();
    once.insert_value(net("1.0.0.0/16"), city("A")).unwrap();

    let mut twice = v4_tree();
    twice.insert_value(net("1.0.0.0/16"), city("A")).unwrap();
    twice.insert_value(net("1.0.0.0/16"), city("A")).unwrap();

    assert_eq!(once.to_bytes().unwrap(), twice.to_bytes().unwrap());
}

#[test]
fn test_remove_clears_and_compacts() {
    let mut tree = v4_tree();
    let baseline = tree.node_count();

    tree.insert_value(net("1.0.0.0/16"), city("A")).unwrap();
    tree.remove(net("1.0.128.0/17")).unwrap();
    assert_eq!(tree.get(ip("1.0.200.1")).unwrap().1, None);
    assert_eq!(tree.get(ip("1.0.1.1")).unwrap().1, Some(&city("A")));

    tree.remove(net("1.0.0.0/17")).unwrap();
    assert_eq!(tree.node_count(), baseline);
    assert_eq!(tree.data_entries(), 0);
}

#[test]
fn test_insert_range() {
    let mut tree = v4_tree();
    tree.insert_range_with(ip("1.0.0.1"), ip("1.0.0.6"), &Strategy::Replace, city("r"))
        .unwrap();

    assert_eq!(tree.get(ip("1.0.0.0")).unwrap().1, None);
    assert_eq!(tree.get(ip("1.0.0.1")).unwrap().1, Some(&city("r")));
    assert_eq!(tree.get(ip("1.0.0.6")).unwrap().1, Some(&city("r")));
    assert_eq!(tree.get(ip("1.0.0.7")).unwrap().1, None);

    assert!(matches!(
        tree.insert_range_with(ip("1.0.0.9"), ip("1.0.0.1"), &Strategy::Replace, city("r")),
        Err(WriterError::InvalidRange(_))
    ));
}

#[test]
fn test_top_level_merge_across_overlaps() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.0.0.0/16"), DataValue::from([("a", 1u32)]))
        .unwrap();
    tree.insert_with(
        net("1.0.0.0/24"),
        &Strategy::TopLevelMerge,
        DataValue::from([("b", 2u32)]),
    )
    .unwrap();

    let merged = tree.get(ip("1.0.0.1")).unwrap().1.unwrap();
    assert_eq!(merged.get("a"), Some(&DataValue::Uint32(1)));
    assert_eq!(merged.get("b"), Some(&DataValue::Uint32(2)));

    let untouched = tree.get(ip("1.0.1.1")).unwrap().1.unwrap();
    assert_eq!(untouched.get("b"), None);
    assert_eq!(tree.data_entries(), 2);
}

#[test]
fn test_custom_merge_function() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.0.0.0/24"), DataValue::Uint32(1))
        .unwrap();

    // Counts how many inserts touched each address
    tree.insert(net("1.0.0.0/25"), |old| {
        let n = old.and_then(DataValue::as_u64).unwrap_or(0) as u32;
        Ok(Some(DataValue::Uint32(n + 1)))
    })
    .unwrap();

    assert_eq!(tree.get(ip("1.0.0.1")).unwrap().1, Some(&DataValue::Uint32(2)));
    assert_eq!(tree.get(ip("1.0.0.200")).unwrap().1, Some(&DataValue::Uint32(1)));
}

#[test]
fn test_identical_values_stored_once() {
    let mut tree = v4_tree();
    for i in 0..100u32 {
        let network = IpNet::new(IpAddr::from([20, i as u8, 0, 0]), 16).unwrap();
        tree.insert_value(network, city("shared")).unwrap();
    }
    assert_eq!(tree.data_entries(), 1);
}

#[test]
fn test_broader_insert_merges_each_covered_leaf() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.0.0.0/25"), city("A")).unwrap();

    let mut seen = Vec::new();
    tree.insert(net("1.0.0.0/24"), |old| {
        seen.push(old.cloned());
        Ok(Some(city("B")))
    })
    .unwrap();
    assert_eq!(seen, vec![Some(city("A")), None]);

    // Both halves now hold B, so the /24 collapses back to one record
    assert_eq!(tree.get(ip("1.0.0.200")).unwrap().0, net("1.0.0.0/24"));
}

#[test]
fn test_broader_insert_visits_every_split_level() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.0.0.0/25"), city("A")).unwrap();

    // Nodes at depths 16..=23 each have one empty sibling, depth 24 has two leaves
    let mut calls = 0;
    tree.insert(net("1.0.0.0/16"), |old| {
        calls += 1;
        Ok(old.cloned())
    })
    .unwrap();
    assert_eq!(calls, 10);
    assert_eq!(tree.get(ip("1.0.0.1")).unwrap().1, Some(&city("A")));
    assert_eq!(tree.get(ip("1.0.200.1")).unwrap().1, None);
}

#[test]
fn test_failed_merge_keeps_earlier_leaves() {
    let mut tree = v4_tree();
    tree.insert_value(net("1.0.0.0/25"), city("A")).unwrap();
    tree.insert_value(net("1.0.0.128/25"), city("B")).unwrap();

    let mut calls = 0;
    let result = tree.insert(net("1.0.0.0/24"), |_| {
        calls += 1;
        if calls == 1 {
            Ok(Some(city("C")))
        } else {
            Err(WriterError::merge_conflict("second half refuses"))
        }
    });
    assert!(matches!(result, Err(WriterError::MergeConflict(_))));

    // Inserts are not atomic: the left half was already rewritten
    assert_eq!(tree.get(ip("1.0.0.1")).unwrap().1, Some(&city("C")));
    assert_eq!(tree.get(ip("1.0.0.200")).unwrap().1, Some(&city("B")));
    assert_eq!(tree.data_entries(), 2);
}
