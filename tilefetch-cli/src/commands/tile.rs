//! Tile command - download one tile from a preset provider.

use std::path::PathBuf;

use clap::ValueEnum;
use tilefetch::provider::{TemplateTileProvider, TileProvider};
use tilefetch::TileProviderError;
use tracing::info;

use super::common::write_output;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Imagery provider selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ProviderType {
    /// Esri ArcGIS World Imagery (no API key required)
    Arcgis,
    /// Google legacy satellite tiles
    Google,
}

/// Arguments for the tile command.
pub struct TileArgs {
    pub provider: ProviderType,
    pub x: u32,
    pub y: u32,
    pub level: u32,
    pub retries: u32,
    pub google_api_key: Option<String>,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
}

/// Run the tile command.
pub async fn run(args: TileArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("tile");

    let context = runner.context().clone();
    let provider = match args.provider {
        ProviderType::Arcgis => TemplateTileProvider::arcgis_world_imagery(context)?,
        ProviderType::Google => {
            TemplateTileProvider::google_legacy(context, args.google_api_key.as_deref())?
        }
    };

    let retries = args.retries as i32;
    provider
        .error_event()
        .add_event_listener(move |error: &mut TileProviderError| {
            error.retry = error.times_retried < retries;
            eprintln!("{} (attempt {})", error, error.times_retried + 1);
        });

    println!("Using provider: {}", provider.name());
    for credit in provider.credits() {
        println!("  Imagery: {}", credit);
    }

    let start = std::time::Instant::now();
    let bytes = provider.load_tile(args.x, args.y, args.level).await?;
    info!(
        x = args.x,
        y = args.y,
        level = args.level,
        bytes = bytes.len(),
        "tile downloaded"
    );
    println!(
        "Downloaded {} bytes in {:.2}s",
        bytes.len(),
        start.elapsed().as_secs_f64()
    );

    write_output(&args.output, &bytes)
}
