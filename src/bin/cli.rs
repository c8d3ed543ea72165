//! Catalog sitemap CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use catalog_sitemap::{
    error::{AppError, Result},
    models::{Config, Credentials, Layout},
    pipeline::{self, GenerateOptions},
    sitemap::{Manifest, Verifier},
    source::{CatalogSource, MemoryCatalog, RestCatalogSource},
    storage::{DryRunStorage, LocalStorage, SitemapStorage},
    utils::UrlScheme,
};
use clap::{Parser, Subcommand, ValueEnum};

/// Sharded XML sitemaps for a parts catalog
#[derive(Parser, Debug)]
#[command(
    name = "catalog-sitemap",
    version,
    about = "Catalog sitemap generator"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sitemap.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and publish the sitemap tree
    Generate {
        /// Manufacturer to generate (repeatable; default from config)
        #[arg(short, long = "manufacturer")]
        manufacturers: Vec<String>,

        /// Override output.dir
        #[arg(long)]
        output_dir: Option<String>,

        /// Override output.shard_capacity
        #[arg(long)]
        capacity: Option<usize>,

        /// Override source.page_size
        #[arg(long)]
        page_size: Option<usize>,

        /// Override output.workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override output.layout
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Read the catalog from a JSON snapshot instead of the API
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Plan the tree without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Exit with an error if any scope was skipped, counts disagree or verification failed
        #[arg(long)]
        strict: bool,
    },

    /// Check the published tree for dangling references and capacity violations
    Verify {
        /// Override output.dir
        #[arg(long)]
        output_dir: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Show the last published manifest
    Info {
        /// Override output.dir
        #[arg(long)]
        output_dir: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Tiered,
    Flat,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Tiered => Layout::Tiered,
            LayoutArg::Flat => Layout::Flat,
        }
    }
}

/// Initialize logging; `--verbose` overrides the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = match &loaded {
        Ok(config) => config.logging.level.clone(),
        Err(_) => Config::default().logging.level,
    };
    init_logging(cli.verbose, &level);

    let mut config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };

    match cli.command {
        Command::Generate {
            manufacturers,
            output_dir,
            capacity,
            page_size,
            workers,
            layout,
            fixture,
            dry_run,
            strict,
        } => {
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            if let Some(capacity) = capacity {
                config.output.shard_capacity = capacity;
            }
            if let Some(page_size) = page_size {
                config.source.page_size = page_size;
            }
            if let Some(workers) = workers {
                config.output.workers = workers;
            }
            if let Some(layout) = layout {
                config.output.layout = layout.into();
            }
            config.validate()?;

            let source: Arc<dyn CatalogSource> = match fixture {
                Some(path) => {
                    log::info!("Reading catalog snapshot {}", path.display());
                    Arc::new(MemoryCatalog::load(&path)?)
                }
                None => {
                    let credentials = Credentials::from_env()?;
                    Arc::new(RestCatalogSource::new(&credentials, &config.source)?)
                }
            };
            let storage: Arc<dyn SitemapStorage> = if dry_run {
                Arc::new(DryRunStorage::new())
            } else {
                Arc::new(LocalStorage::new(&config.output.dir))
            };

            let options = GenerateOptions {
                manufacturers,
                dry_run,
                strict,
                ..GenerateOptions::default()
            };
            let cancel = Arc::clone(&options.cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted; finishing the current scopes and publishing what is done");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let summary = pipeline::run_generate(&config, source, storage, &options).await?;
            if !summary.is_complete() {
                log::warn!("Sitemap tree published with skipped scopes");
            }
        }

        Command::Verify { output_dir } => {
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            let scheme = UrlScheme::new(&config.site)?;
            let storage = LocalStorage::new(&config.output.dir);
            let report = Verifier::new(&storage, &scheme, config.output.shard_capacity)
                .verify(None)
                .await?;

            log::info!(
                "{} indexes, {} shards, {} URLs reachable from the root",
                report.indexes,
                report.shards,
                report.urls
            );
            for key in &report.dangling {
                log::error!("Dangling reference: {}", key);
            }
            for key in &report.duplicate_references {
                log::error!("Referenced more than once: {}", key);
            }
            for (key, entries) in &report.over_capacity {
                log::error!("{} holds {} entries", key, entries);
            }
            if !report.duplicate_urls.is_empty() {
                log::error!("{} URLs listed more than once", report.duplicate_urls.len());
            }
            if !report.is_ok() {
                return Err(AppError::validation(format!(
                    "sitemap tree has {} problems",
                    report.problems()
                )));
            }
            log::info!("✓ Sitemap tree OK");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            UrlScheme::new(&config.site)?;
            log::info!("✓ Config OK");

            match Credentials::from_env() {
                Ok(credentials) => log::info!("✓ Catalog API at {}", credentials.api_url),
                Err(e) => log::warn!("{} (only --fixture runs will work)", e),
            }
        }

        Command::Info { output_dir } => {
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            let storage = LocalStorage::new(&config.output.dir);
            let manifest = Manifest::load(&storage).await?;

            log::info!("Output directory: {}", config.output.dir);
            match manifest.generated_at {
                Some(at) => {
                    log::info!("Last run: {}", at);
                    log::info!(
                        "{} shards, {} indexes, {} URLs{}",
                        manifest.shard_count(),
                        manifest.index_count(),
                        manifest.url_count(),
                        if manifest.complete { "" } else { " (partial run)" }
                    );
                }
                None => log::info!("No sitemap published yet."),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
