//! Tilefetch CLI - Command-line interface
//!
//! This binary provides a command-line interface to the tilefetch library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::fetch::{FetchArgs, FetchAs};
use commands::tile::{ProviderType, TileArgs};
use error::CliError;

#[derive(Parser)]
#[command(name = "tilefetch")]
#[command(version, about = "Fetch tile and imagery resources", long_about = None)]
struct Cli {
    /// Config file (default: ~/.tilefetch/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print or save the result
    Fetch {
        /// Resource URL; may contain {key} template tokens
        url: String,

        /// How to interpret the response
        #[arg(long = "as", value_enum, default_value = "text")]
        fetch_as: FetchAs,

        /// Query parameter (key=value, repeatable)
        #[arg(short = 'q', long = "query")]
        query: Vec<String>,

        /// Request header ('Name: value', repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Template value for {key} tokens (key=value, repeatable)
        #[arg(short = 't', long = "template")]
        templates: Vec<String>,

        /// Retry transport failures up to N times (default from config)
        #[arg(long)]
        retries: Option<u32>,

        /// Route the request through a proxy prefix
        #[arg(long)]
        proxy: Option<String>,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download one tile from a preset provider
    Tile {
        /// Imagery provider to use
        #[arg(long, value_enum, default_value = "arcgis")]
        provider: ProviderType,

        /// Tile column
        #[arg(long)]
        x: u32,

        /// Tile row
        #[arg(long)]
        y: u32,

        /// Zoom level
        #[arg(long)]
        level: u32,

        /// Retry a failing tile up to N times
        #[arg(long, default_value = "3")]
        retries: u32,

        /// Google Maps API key (used with --provider google)
        #[arg(long)]
        google_api_key: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Fetch {
            url,
            fetch_as,
            query,
            headers,
            templates,
            retries,
            proxy,
            output,
        } => {
            commands::fetch::run(FetchArgs {
                url,
                fetch_as,
                query,
                headers,
                templates,
                retries,
                proxy,
                output,
                config: cli.config,
            })
            .await
        }
        Commands::Tile {
            provider,
            x,
            y,
            level,
            retries,
            google_api_key,
            output,
        } => {
            commands::tile::run(TileArgs {
                provider,
                x,
                y,
                level,
                retries,
                google_api_key,
                output,
                config: cli.config,
            })
            .await
        }
        Commands::Config(command) => commands::config::run(command, cli.config),
    };

    if let Err(e) = result {
        e.exit();
    }
}
