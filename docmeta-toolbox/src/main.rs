use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use docmeta_config::CONFIG;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod commands;

#[derive(Debug, Parser)]
#[command(name = "docmeta", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv). Use -q to quiet.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors. Overrides -v.
    #[arg(short = 'q', long, action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[arg(
        value_name = "INDEX_PATH",
        short = 'i',
        long,
        global = true,
        default_value = ".",
        help = "Directory holding the index"
    )]
    index: PathBuf,

    #[arg(
        value_name = "PREFIX",
        short = 'p',
        long,
        global = true,
        help = "Index prefix [default: DOCMETA_INDEX_PREFIX]"
    )]
    prefix: Option<String>,

    #[arg(
        value_name = "STRUCTURE",
        short = 's',
        long,
        global = true,
        default_value = "meta",
        help = "Structure name"
    )]
    structure: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a structure from a CSV file whose header names the keys.
    Build {
        #[arg(value_name = "CSV_PATH", short, long, required = true)]
        file_path: PathBuf,

        #[arg(
            value_name = "KEYS",
            short,
            long,
            value_delimiter = ',',
            help = "Keys to store, in order [default: every CSV column]"
        )]
        keys: Vec<String>,

        #[arg(
            value_name = "REVERSE_KEYS",
            short,
            long,
            value_delimiter = ',',
            help = "Keys that support value -> document lookups"
        )]
        reverse_keys: Vec<String>,

        #[arg(
            value_name = "COMPRESSED_KEYS",
            short,
            long,
            value_delimiter = ',',
            help = "Keys whose values are stored LZ4-compressed"
        )]
        compressed_keys: Vec<String>,

        #[arg(
            long,
            help = "Serve sorted reverse keys by binary search instead of a stored map [default: false]",
            default_value = "false"
        )]
        skip_sorted_reverse_maps: bool,

        #[arg(
            value_name = "CSV_DELIMITER",
            short,
            long,
            help = "CSV delimiter",
            default_value = ",",
            value_parser = parse_csv_delimiter
        )]
        delimiter: u8,
    },
    /// Print the schema and lookup strategies of a structure.
    Info,
    /// Print the values of one document.
    Get {
        #[arg(value_name = "DOC_ID", required = true)]
        id: u32,

        #[arg(value_name = "KEYS", short, long, value_delimiter = ',')]
        keys: Vec<String>,
    },
    /// Resolve a value of a reverse key to its document id.
    Lookup {
        #[arg(value_name = "KEY", required = true)]
        key: String,

        #[arg(value_name = "VALUE", required = true)]
        value: String,
    },
    /// Stream every document as CSV to stdout.
    Dump {
        #[arg(value_name = "LIMIT", short, long, help = "Limit the number of documents")]
        limit: Option<usize>,
    },
}

fn parse_csv_delimiter(s: &str) -> Result<u8, String> {
    if s.len() != 1 {
        return Err(format!(
            "Invalid CSV delimiter: '{}'. Must be a single character.",
            s
        ));
    }
    Ok(s.as_bytes()[0])
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => CONFIG.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let prefix = cli
        .prefix
        .unwrap_or_else(|| CONFIG.index_prefix.clone());
    let target = commands::Target {
        index: cli.index,
        prefix,
        structure: cli.structure,
    };

    match cli.command {
        Commands::Build {
            file_path,
            keys,
            reverse_keys,
            compressed_keys,
            skip_sorted_reverse_maps,
            delimiter,
        } => commands::build::build(
            &target,
            &file_path,
            commands::build::BuildArgs {
                keys,
                reverse_keys,
                compressed_keys,
                skip_sorted_reverse_maps,
                delimiter,
            },
        ),
        Commands::Info => commands::info::info(&target, &mut std::io::stdout().lock()),
        Commands::Get { id, keys } => {
            commands::get::get(&target, id, &keys, &mut std::io::stdout().lock())
        }
        Commands::Lookup { key, value } => {
            commands::lookup::lookup(&target, &key, &value, &mut std::io::stdout().lock())
        }
        Commands::Dump { limit } => commands::dump::dump(&target, limit, std::io::stdout().lock()),
    }
}
