//! ontomap: concept lookup CLI
//!
//! Thin front end over [`ontomap::ConceptLookup`]; prints JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ontomap::{CacheManager, Config, ConceptLookup, LookupOptions, OntomapError, Secrets};

/// BioPortal/OLS concept lookup
#[derive(Parser)]
#[command(name = "ontomap")]
#[command(version = ontomap::PKG_VERSION)]
#[command(about = "Look up biomedical concepts in BioPortal and OLS")]
struct Args {
    /// Config file (default: ~/.ontomap/config.toml, then /etc/ontomap/config.toml)
    #[arg(short, long, env = "ONTOMAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look a concept up across services
    Lookup {
        /// Concept text to search for
        query: String,
        /// Concept type or key whose search strategy to apply (e.g. Disease)
        #[arg(long)]
        concept: Option<String>,
        /// Extra query texts to search, merged per service
        #[arg(long, value_delimiter = ',')]
        variants: Vec<String>,
        /// Ontology acronyms to restrict to (e.g. MONDO,HP)
        #[arg(long, value_delimiter = ',')]
        ontologies: Vec<String>,
        /// Services to query (default: all configured)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,
        /// Results per service
        #[arg(short = 'n', long, default_value_t = 5)]
        max_results: usize,
        /// Print the service health report after the lookup
        #[arg(long)]
        health: bool,
    },

    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache directory and configuration
    Stats,
    /// Remove every cached entry
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), OntomapError> {
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Lookup {
            query,
            concept,
            variants,
            ontologies,
            services,
            max_results,
            health,
        } => {
            let secrets = Secrets::load()?;
            let lookup = ConceptLookup::from_config(&config, &secrets)?;
            let mut options = LookupOptions::default()
                .ontologies(ontologies)
                .variants(variants)
                .max_results(max_results);
            if let Some(key) = concept {
                options = lookup.strategy_options(&key, &query, &options);
            }
            let services: Vec<&str> = services.iter().map(String::as_str).collect();

            let cancel = tokio_util::sync::CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let result = lookup
                .lookup_cancellable(&query, &services, &options, &cancel)
                .await;
            if health {
                eprintln!("{}", serde_json::to_string_pretty(&lookup.health_report())?);
            }
            let outcome = result?;
            for notice in &outcome.notices {
                eprintln!("warning: {notice}");
            }
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Cache { action } => {
            let Some(cache_config) = config.cache_config() else {
                eprintln!("cache is disabled in configuration");
                return Ok(());
            };
            let cache = CacheManager::new(cache_config);
            match action {
                // Hit and miss counters belong to a running lookup; a fresh
                // process only has the directory and configuration to show.
                CacheAction::Stats => {
                    let stats = cache.stats();
                    let view = serde_json::json!({
                        "persistent": stats.persistent,
                        "dir": cache.persist_dir(),
                        "disk_entries": stats.disk_entries,
                        "ttl_secs": stats.ttl_secs,
                        "max_size_bytes": cache.config().max_size_bytes,
                    });
                    println!("{}", serde_json::to_string_pretty(&view)?);
                }
                CacheAction::Clear => {
                    let removed = cache.clear();
                    println!("removed {removed} cache entries");
                }
            }
        }
    }

    Ok(())
}
