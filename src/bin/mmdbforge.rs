mod commands;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::net::IpAddr;
use std::path::PathBuf;

use commands::{cmd_build, cmd_lookup, cmd_metadata, BuildArgs};

#[derive(Parser)]
#[command(name = "mmdbforge")]
#[command(
    about = "Build MaxMind DB files from CSV or JSON network lists",
    long_about = "mmdbforge - Builder for MaxMind DB (.mmdb) IP databases\n\n\
    Reads networks, addresses or address ranges with attached data and writes a \n\
    compact MaxMind DB file readable by any MMDB reader.\n\n\
    Examples:\n\
      mmdbforge build networks.csv -o geo.mmdb\n\
      mmdbforge build a.json.gz b.json --format json --merge deep -o geo.mmdb\n\
      mmdbforge lookup geo.mmdb 1.1.1.1\n\
      mmdbforge metadata geo.mmdb"
)]
#[command(version)]
struct Cli {
    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a database from CSV or JSON inputs
    Build {
        /// Input files (.gz is decompressed), or "-" for stdin
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output database file
        #[arg(short, long)]
        output: PathBuf,

        /// Input format: csv or json (default: from the file extension)
        #[arg(long)]
        format: Option<String>,

        /// Tree build options as a JSON file; flags override its values
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// IP version of the tree: 4 or 6
        #[arg(long, value_parser = ["4", "6"])]
        ip_version: Option<String>,

        /// Record size in bits: 24, 28 or 32
        #[arg(long, value_parser = ["24", "28", "32"])]
        record_size: Option<String>,

        /// How overlapping records combine: replace, toplevel, deep, keep or remove
        #[arg(long, default_value = "replace")]
        merge: String,

        /// Allow data in reserved (non-routable) networks
        #[arg(long)]
        include_reserved: bool,

        /// Keep IPv4-mapped, Teredo and 6to4 space separate from IPv4
        #[arg(long)]
        disable_ipv4_aliasing: bool,

        /// database_type metadata value
        #[arg(long)]
        database_type: Option<String>,

        /// Database description
        #[arg(long)]
        description: Option<String>,

        /// Language code of --description
        #[arg(long, default_value = "en")]
        desc_lang: String,
    },

    /// Look up an IP address in a database
    Lookup {
        /// Database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,

        /// Address to look up
        ip: IpAddr,
    },

    /// Print database metadata as JSON
    Metadata {
        /// Database file
        #[arg(value_name = "DATABASE")]
        database: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Build {
            inputs,
            output,
            format,
            config,
            ip_version,
            record_size,
            merge,
            include_reserved,
            disable_ipv4_aliasing,
            database_type,
            description,
            desc_lang,
        } => cmd_build(BuildArgs {
            inputs,
            output,
            format,
            config,
            ip_version,
            record_size,
            merge,
            include_reserved,
            disable_ipv4_aliasing,
            database_type,
            description,
            desc_lang,
        }),
        Commands::Lookup { database, ip } => cmd_lookup(database, ip),
        Commands::Metadata { database } => cmd_metadata(database),
    }
}
