use anyhow::{Context, Result};
use mmdbforge::mmdb::Reader;
use std::path::PathBuf;

pub fn cmd_metadata(database: PathBuf) -> Result<()> {
    let reader = Reader::open(&database)
        .with_context(|| format!("Failed to open database: {}", database.display()))?;

    println!("{}", serde_json::to_string_pretty(reader.metadata())?);

    Ok(())
}
