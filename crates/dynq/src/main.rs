//! dynq command-line entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynq::{
    compile_options, CatalogHandle, DynqConfig, Executor, FindRequest, MySqlConnectionManager,
    ObservabilitySystem, SchemaCatalog,
};
use dynq_shared::DEFAULT_CONFIG_FILE;
use sqlx::mysql::MySqlPool;
use std::path::{Path, PathBuf};
use tracing::info;

/// Compile JSON find requests to MySQL and run them
#[derive(Parser, Debug)]
#[command(name = "dynq")]
#[command(version, about = "Compile JSON find requests to MySQL and run them")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Schema catalog file, overrides `catalog.path`
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the statements a request would run
    Explain {
        /// JSON find request file
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Run a request and print the `{data, meta}` envelope
    Run {
        #[arg(short, long)]
        request: PathBuf,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = DynqConfig::load_from_file(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    ObservabilitySystem::init(&config.observability)?;

    let catalog_path = args
        .catalog
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.catalog.path));
    let catalog = SchemaCatalog::from_path(&catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    let catalog = CatalogHandle::new(catalog);

    match args.command {
        Command::Explain { request } => {
            let request = read_request(&request)?;
            // explain never touches the database
            let pool = MySqlPool::connect_lazy(&config.database.url)?;
            let executor = Executor::new(pool, catalog, compile_options(&config.query));
            for statement in executor.explain(&request)? {
                println!("{statement};");
            }
        }
        Command::Run { request, pretty } => {
            let request = read_request(&request)?;
            let manager = MySqlConnectionManager::new(&config.database).await?;
            info!(version = %manager.get_version().await?, "Connected to MySQL");

            let executor = Executor::new(manager.into_pool(), catalog, compile_options(&config.query))
                .with_statement_timeout(config.database.statement_timeout());
            let response = executor.find(&request).await?;
            let output = if pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{output}");
        }
    }

    Ok(())
}

fn read_request(path: &Path) -> Result<FindRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing request {}", path.display()))
}
