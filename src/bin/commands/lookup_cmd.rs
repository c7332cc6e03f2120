use anyhow::{Context, Result};
use mmdbforge::mmdb::Reader;
use serde_json::json;
use std::net::IpAddr;
use std::path::PathBuf;

pub fn cmd_lookup(database: PathBuf, ip: IpAddr) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to open database: {}", database.display()))?;

    let (network, data) = reader
        .lookup(ip)
        .with_context(|| format!("Lookup failed for {}", ip))?;

    let result = json!({
        "network": network.to_string(),
        "data": data.map(|value| value.to_json()),
    });
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
