use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    decompress_payload, import_kit, inspect_kit, merge_layer_files, reorganize_kit,
    reset_config, set_config_value, show_config, DecompressPayloadArgs, ImportKitArgs,
    InspectKitArgs, MergeLayerFilesArgs, ReorganizeKitArgs,
};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompress a packed kit payload to plain JSON
    Decompress {
        /// The payload file (page data JSON or a [vocabulary, root] pair)
        #[arg(short, long)]
        input: String,

        /// Where to write the JSON; printed to stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Import a kit: decompress it, then download and reorganize its layers
    Import {
        /// The payload file (page data JSON or a [vocabulary, root] pair)
        #[arg(short, long)]
        input: String,

        /// The directory kits and the blob cache are written to
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Worker threads (0 = one per core, 1 = sequential)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Re-run the reorganization of an imported kit from its metadata.json
    Reorganize {
        /// The kit folder or its metadata.json
        kit: String,

        /// Worker threads (0 = one per core, 1 = sequential)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Show the folder structure of an imported kit
    Inspect {
        /// The kit folder
        kit: String,

        /// Print the structure as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge numbered layer files of one folder into a single file
    Merge {
        /// The render-layer or colour folder holding the files
        dir: String,

        /// File numbers to merge, bottom to top (e.g. 1,2,3)
        #[arg(short, long, value_delimiter = ',', required = true)]
        files: Vec<u32>,

        /// Number of the merged file; defaults to the first merged file
        #[arg(short, long)]
        dest: Option<u32>,
    },
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show,
    /// Set one configuration value
    Set { key: String, value: String },
    /// Restore the default configuration
    Reset,
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "neka_kit=debug,neka_vocab=debug"
    } else {
        "neka_kit=info,neka_vocab=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(args.verbose);

    match args.command {
        Commands::Decompress { input, output } => {
            decompress_payload(DecompressPayloadArgs { input, output })
        }
        Commands::Import {
            input,
            output_dir,
            workers,
        } => import_kit(ImportKitArgs {
            input,
            output_dir,
            workers,
        }),
        Commands::Reorganize { kit, workers } => reorganize_kit(ReorganizeKitArgs { kit, workers }),
        Commands::Inspect { kit, json } => inspect_kit(InspectKitArgs { kit, json }),
        Commands::Merge { dir, files, dest } => {
            merge_layer_files(MergeLayerFilesArgs { dir, files, dest })
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => show_config(),
            ConfigCommands::Set { key, value } => set_config_value(key, value),
            ConfigCommands::Reset => reset_config(),
        },
    }
}
