//! Address range to CIDR decomposition

use crate::error::{Result, WriterError};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;

/// Split `[start, end]` into the minimal list of covering networks
///
/// Networks are returned in ascending address order and partition the range
/// exactly. Both ends must be of the same family and `start <= end`.
pub fn range_to_cidrs(start: IpAddr, end: IpAddr) -> Result<Vec<IpNet>> {
    match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => {
            check_order(u32::from(s) as u128, u32::from(e) as u128, start, end)?;
            decompose(u32::from(s) as u128, u32::from(e) as u128, 32)
                .into_iter()
                .map(|(base, prefix)| {
                    Ipv4Net::new((base as u32).into(), prefix)
                        .map(IpNet::V4)
                        .map_err(|e| WriterError::invalid_range(e.to_string()))
                })
                .collect()
        }
        (IpAddr::V6(s), IpAddr::V6(e)) => {
            check_order(u128::from(s), u128::from(e), start, end)?;
            decompose(u128::from(s), u128::from(e), 128)
                .into_iter()
                .map(|(base, prefix)| {
                    Ipv6Net::new(base.into(), prefix)
                        .map(IpNet::V6)
                        .map_err(|e| WriterError::invalid_range(e.to_string()))
                })
                .collect()
        }
        _ => Err(WriterError::invalid_range(format!(
            "{} and {} are not the same address family",
            start, end
        ))),
    }
}

fn check_order(s: u128, e: u128, start: IpAddr, end: IpAddr) -> Result<()> {
    if s > e {
        return Err(WriterError::invalid_range(format!(
            "start {} is after end {}",
            start, end
        )));
    }
    Ok(())
}

/// Greedy decomposition over a `width`-bit address space
///
/// At each step take the largest block that is aligned at the cursor and
/// does not run past `end`.
pub(crate) fn decompose(start: u128, end: u128, width: u8) -> Vec<(u128, u8)> {
    let mut blocks = Vec::new();
    let mut cur = start;
    loop {
        let align = if cur == 0 {
            width as u32
        } else {
            cur.trailing_zeros()
        };
        // floor(log2(remaining)), where remaining = end - cur + 1 may be 2^128
        let fit = match (end - cur).checked_add(1) {
            Some(remaining) => 127 - remaining.leading_zeros(),
            None => 128,
        };
        let host_bits = align.min(fit).min(width as u32);
        blocks.push((cur, width - host_bits as u8));

        let last = if host_bits == 128 {
            u128::MAX
        } else {
            cur + ((1u128 << host_bits) - 1)
        };
        if last >= end {
            break;
        }
        cur = last + 1;
    }
    blocks
}
