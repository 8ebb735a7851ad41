// MinIO Rust Library for Overture Maps GeoParquet Extraction
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{ArgGroup, Args, Parser, Subcommand};
use overturemaps::config::{CatalogConfig, StorageConfig};
use overturemaps::error::{Error, Result};
use overturemaps::extract::{Extractor, StreamingQuery, TypeSelection};
use overturemaps::geo::BoundingBox;
use overturemaps::release::latest_version;
use overturemaps::sink::{FeatureSink, OutputFormat, OutputTarget};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Extract Overture Maps data from the public GeoParquet release.
#[derive(Parser)]
#[command(name = "overturemaps", version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download features of one type, optionally inside a bounding box
    Download(DownloadArgs),
    /// Look up a single feature by GERS id
    Gers(GersArgs),
    /// List the releases available in the bucket
    Releases(ConnectionArgs),
}

#[derive(Args)]
struct ConnectionArgs {
    /// Seconds to wait for a connection
    #[arg(long, value_name = "SECONDS")]
    connect_timeout: Option<f64>,
    /// Seconds to wait for any single request
    #[arg(long, value_name = "SECONDS")]
    request_timeout: Option<f64>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("kind").required(true).multiple(true).args(["type_", "type_name"])))]
struct DownloadArgs {
    /// west,south,east,north in degrees; west > east crosses the antimeridian
    #[arg(long, value_name = "W,S,E,N", allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,
    #[arg(short, long, value_enum)]
    format: OutputFormat,
    /// Output file; standard output when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Type to read, e.g. building or place
    #[arg(short = 't', long = "type")]
    type_: Option<String>,
    /// Theme directory, overriding the built-in type table
    #[arg(long)]
    theme: Option<String>,
    /// Type directory to use together with --theme
    #[arg(long)]
    type_name: Option<String>,
    /// Release version; latest when omitted
    #[arg(long)]
    release: Option<String>,
    /// Prune partitions with the STAC catalog (default)
    #[arg(long, overrides_with = "no_stac")]
    stac: bool,
    /// List every partition instead of asking the STAC catalog
    #[arg(long, overrides_with = "stac")]
    no_stac: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct GersArgs {
    /// GERS id of the feature
    id: String,
    #[arg(short, long, value_enum, default_value = "geojsonseq")]
    format: OutputFormat,
    /// Output file; standard output when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Only scan this type
    #[arg(short = 't', long = "type")]
    type_: Option<String>,
    /// Release version; latest when omitted
    #[arg(long)]
    release: Option<String>,
    /// Skip the GERS registry and scan partitions directly
    #[arg(long)]
    no_registry: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}

fn configs(connection: &ConnectionArgs) -> Result<(StorageConfig, CatalogConfig)> {
    let mut storage = StorageConfig::from_env();
    let mut catalog = CatalogConfig::from_env()?;
    if let Some(timeout) = seconds(connection.connect_timeout) {
        storage.connect_timeout = Some(timeout);
        catalog.connect_timeout = Some(timeout);
    }
    if let Some(timeout) = seconds(connection.request_timeout) {
        storage.request_timeout = Some(timeout);
        catalog.request_timeout = Some(timeout);
    }
    Ok((storage, catalog))
}

fn target(output: Option<&PathBuf>) -> Result<OutputTarget> {
    match output {
        Some(path) => OutputTarget::file(path),
        None => Ok(OutputTarget::stdout()),
    }
}

async fn download(args: DownloadArgs) -> Result<()> {
    let theme = args.theme.clone();
    let types = TypeSelection::from_parts(args.type_, args.theme, args.type_name).ok_or_else(
        || Error::UnknownType {
            name: theme.unwrap_or_default(),
            expected: "--type, or --theme with --type-name".to_string(),
        },
    )?;
    let use_catalog = args.stac || !args.no_stac;
    let (storage, mut catalog) = configs(&args.connection)?;
    catalog.enabled = use_catalog;
    catalog.registry = false;
    let extractor = Extractor::from_config(&storage, &catalog)?;

    let query = StreamingQuery::builder()
        .types(types)
        .format(args.format)
        .use_catalog(use_catalog)
        .build();
    let query = StreamingQuery {
        bbox: args.bbox,
        release: args.release,
        ..query
    };

    let mut sink = FeatureSink::open(query.format, target(args.output.as_ref())?);
    let summary = extractor.download(&query, &mut sink).await?;
    log::info!(
        "release {}: {} features from {} partitions ({:?})",
        summary.release,
        summary.rows_written,
        summary.partitions.retained,
        summary.partition_source
    );
    Ok(())
}

async fn gers(args: GersArgs) -> Result<()> {
    let (storage, mut catalog) = configs(&args.connection)?;
    catalog.enabled = false;
    catalog.registry = !args.no_registry;
    let extractor = Extractor::from_config(&storage, &catalog)?;

    let hint = args.type_.map(TypeSelection::Named);
    let hit = extractor
        .lookup(&args.id, hint.as_ref(), args.release.as_deref())
        .await?;

    let mut sink = FeatureSink::open(args.format, target(args.output.as_ref())?);
    let written = sink
        .write_batch(&hit.record)
        .and_then(|_| sink.close());
    if written.is_err() {
        sink.abort();
    }
    written?;
    log::info!("{} found in {} ({})", args.id, hit.partition, hit.release);
    Ok(())
}

async fn releases(args: ConnectionArgs) -> Result<()> {
    let (storage, mut catalog) = configs(&args)?;
    catalog.enabled = false;
    catalog.registry = false;
    let versions = Extractor::from_config(&storage, &catalog)?.releases().await?;
    let latest = latest_version(&versions);
    for version in &versions {
        if Some(version.as_str()) == latest {
            println!("{version} (latest)");
        } else {
            println!("{version}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let outcome = match cli.command {
        Commands::Download(args) => download(args).await,
        Commands::Gers(args) => gers(args).await,
        Commands::Releases(args) => releases(args).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
