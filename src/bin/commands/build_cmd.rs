use anyhow::{Context, Result};
use mmdbforge::{IpTreeBuilder, IpVersion, RecordSize, Strategy, TreeOptions};
use std::fs::File;
use std::path::PathBuf;

use crate::input::{read_records, InputFormat};

/// Arguments of `mmdbforge build`
pub struct BuildArgs {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub format: Option<String>,
    pub config: Option<PathBuf>,
    pub ip_version: Option<String>,
    pub record_size: Option<String>,
    pub merge: String,
    pub include_reserved: bool,
    pub disable_ipv4_aliasing: bool,
    pub database_type: Option<String>,
    pub description: Option<String>,
    pub desc_lang: String,
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
    let options = build_options(&args)?;
    let strategy: Strategy = args.merge.parse().map_err(anyhow::Error::msg)?;
    let explicit_format = args.format.as_deref().map(InputFormat::parse).transpose()?;

    let mut tree = IpTreeBuilder::new(options).context("Failed to create tree")?;

    let mut total_records = 0;
    for input in &args.inputs {
        let format = match explicit_format {
            Some(format) => format,
            None => InputFormat::detect(input)?,
        };
        log::info!("Reading {} as {:?}", input.display(), format);

        let records = read_records(input, format)?;
        let count = tree
            .extend_from(records, &strategy)
            .with_context(|| format!("Failed to insert records from {}", input.display()))?;
        log::debug!("{} records from {}", count, input.display());
        total_records += count;
    }

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create output: {}", args.output.display()))?;
    let size = tree
        .write_to(file)
        .with_context(|| format!("Failed to write database: {}", args.output.display()))?;

    println!("✓ Database built: {}", args.output.display());
    println!("  Records:       {}", total_records);
    println!("  Nodes:         {}", tree.node_count());
    println!("  Data entries:  {}", tree.data_entries());
    println!(
        "  Database size: {:.2} MB ({} bytes)",
        size as f64 / (1024.0 * 1024.0),
        size
    );

    Ok(())
}

/// Config file values, overridden by explicit flags
fn build_options(args: &BuildArgs) -> Result<TreeOptions> {
    let mut options = match &args.config {
        Some(path) => TreeOptions::from_json_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => TreeOptions::default(),
    };

    if let Some(version) = &args.ip_version {
        options.ip_version = match version.as_str() {
            "4" => IpVersion::V4,
            _ => IpVersion::V6,
        };
    }
    if let Some(bits) = &args.record_size {
        let bits: u16 = bits.parse().context("Invalid record size")?;
        options.record_size = RecordSize::from_bits(bits)?;
    }
    if args.include_reserved {
        options.include_reserved_networks = true;
    }
    if args.disable_ipv4_aliasing {
        options.disable_ipv4_aliasing = true;
    }
    if let Some(db_type) = &args.database_type {
        options.database_type = db_type.clone();
    }
    if let Some(text) = &args.description {
        options
            .description
            .insert(args.desc_lang.clone(), text.clone());
    }

    Ok(options)
}
