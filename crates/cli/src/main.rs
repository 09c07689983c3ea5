use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use statline_api::{Engine, EngineConfig};
use statline_catalog::Catalog;
use statline_core::EndpointDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod render;

const BUNDLED_CATALOG: &str = include_str!("../../../descriptors/football.yaml");

#[derive(Parser, Debug)]
#[command(name = "statlinectl", version, about = "Descriptor-driven sports statistics client")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Engine config file (YAML); STATLINE_* env vars are applied on top
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Descriptor catalog (YAML); defaults to the bundled football catalog
    #[arg(long = "catalog", global = true)]
    catalog: Option<PathBuf>,

    /// API key sent in the credential header
    #[arg(long = "api-key", env = "STATLINE_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List endpoints, optionally within one category
    Endpoints {
        #[arg(long = "category")]
        category: Option<String>,
    },
    /// List categories in catalog order
    Categories,
    /// Search endpoints by id, description, category or keywords
    Search {
        query: String,
        /// Fuzzy ranked matching instead of substring terms
        #[arg(long = "fuzzy", action = ArgAction::SetTrue)]
        fuzzy: bool,
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
    },
    /// Show parameters, rules and policies of one endpoint
    Describe { id: String },
    /// Validate a descriptor catalog file without loading it
    Check { file: PathBuf },
    /// Fetch rows from an endpoint
    Fetch {
        id: String,
        /// Parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_kv)]
        params: Vec<(String, String)>,
        /// Walk every page of a paged endpoint
        #[arg(long = "all-pages", action = ArgAction::SetTrue)]
        all_pages: bool,
    },
}

fn parse_kv(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}

fn init_tracing() {
    let env = std::env::var("STATLINE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("STATLINE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid STATLINE_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Catalog> {
    let catalog = Catalog::new();
    match path {
        Some(p) => catalog.load_path(p).with_context(|| format!("loading catalog {}", p.display()))?,
        None => catalog.load_str(BUNDLED_CATALOG).context("loading bundled catalog")?,
    };
    Ok(catalog)
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let base = match cli.config.as_ref() {
        Some(p) => EngineConfig::from_path(p).with_context(|| format!("loading config {}", p.display()))?,
        None => EngineConfig::default(),
    };
    let mut cfg = base.overlay_env(std::env::vars()).context("applying STATLINE_* environment")?;
    if let Some(key) = cli.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        cfg.credential = key.trim().to_string();
    }
    Ok(cfg)
}

fn print_endpoints(output: Output, endpoints: &[Arc<EndpointDescriptor>]) -> Result<()> {
    match output {
        Output::Human => {
            for d in endpoints {
                println!("{} • {} • {}", d.id, d.category, d.description);
            }
        }
        Output::Json => {
            let list: Vec<&EndpointDescriptor> = endpoints.iter().map(|d| d.as_ref()).collect();
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Endpoints { category } => {
            let catalog = load_catalog(cli.catalog.as_ref())?;
            let list = match category {
                Some(c) => catalog.list_by_category(c),
                None => catalog.current().all(),
            };
            print_endpoints(cli.output, &list)?;
        }
        Commands::Categories => {
            let catalog = load_catalog(cli.catalog.as_ref())?;
            match cli.output {
                Output::Human => catalog.categories().iter().for_each(|c| println!("{c}")),
                Output::Json => println!("{}", serde_json::to_string_pretty(&catalog.categories())?),
            }
        }
        Commands::Search { query, fuzzy, limit } => {
            let catalog = load_catalog(cli.catalog.as_ref())?;
            if *fuzzy {
                let hits = catalog.search_ranked(query, *limit);
                match cli.output {
                    Output::Human => {
                        for h in hits.iter() {
                            println!("{:>5}  {} • {}", h.score, h.endpoint.id, h.endpoint.description);
                        }
                    }
                    Output::Json => {
                        let rows: Vec<serde_json::Value> = hits
                            .iter()
                            .map(|h| serde_json::json!({ "id": h.endpoint.id, "score": h.score }))
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                }
            } else {
                let hits: Vec<_> = catalog.search(query).into_iter().take(*limit).collect();
                print_endpoints(cli.output, &hits)?;
            }
        }
        Commands::Describe { id } => {
            let catalog = load_catalog(cli.catalog.as_ref())?;
            let d = catalog.get(id)?;
            match cli.output {
                Output::Human => print!("{}", render::describe(&d)),
                Output::Json => println!("{}", serde_json::to_string_pretty(d.as_ref())?),
            }
        }
        Commands::Check { file } => {
            let endpoints = statline_schema::read_source(file).with_context(|| format!("checking {}", file.display()))?;
            match cli.output {
                Output::Human => println!("ok: {} endpoint(s) in {}", endpoints.len(), file.display()),
                Output::Json => println!("{}", serde_json::json!({ "ok": true, "endpoints": endpoints.len() })),
            }
        }
        Commands::Fetch { id, params, all_pages } => {
            let catalog = Arc::new(load_catalog(cli.catalog.as_ref())?);
            let config = load_config(&cli)?;
            if config.credential.is_empty() {
                warn!("no API key configured; set STATLINE_API_KEY or pass --api-key");
            }
            let engine = Engine::new(catalog, &config)?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; cancelling");
                    on_signal.cancel();
                }
            });

            let params = params.clone();
            let fetched = if *all_pages {
                engine.fetch_all(id, params, &cancel).await?
            } else {
                engine.fetch_with_cancel(id, params, &cancel).await?
            };
            for w in fetched.warnings.iter() {
                warn!(endpoint = %id, index = w.index, reason = %w.reason, "element skipped");
            }
            match cli.output {
                Output::Human => print!("{}", render::table(&fetched.rows)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&fetched.rows)?),
            }
            let stats = engine.stats();
            info!(rows = fetched.rows.len(), pages = fetched.pages, network_calls = stats.network_calls, cache_hits = stats.cache_hits, "fetch done");
            if fetched.cancelled {
                bail!("cancelled after {} row(s)", fetched.rows.len());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_parsing() {
        assert_eq!(parse_kv("league=39").unwrap(), ("league".into(), "39".into()));
        assert_eq!(parse_kv("search=a=b").unwrap(), ("search".into(), "a=b".into()));
        assert_eq!(parse_kv("date=").unwrap(), ("date".into(), String::new()));
        assert!(parse_kv("league").is_err());
        assert!(parse_kv("=39").is_err());
    }

    #[test]
    fn bundled_catalog_loads() {
        let c = load_catalog(None).unwrap();
        assert!(c.get("fixtures-by-league").is_ok());
    }

    #[test]
    fn cli_shape_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["statlinectl", "-o", "json", "fetch", "players", "-p", "season=2024", "-p", "team=33", "--all-pages"])
            .unwrap();
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Fetch { id, params, all_pages } => {
                assert_eq!(id, "players");
                assert_eq!(params.len(), 2);
                assert!(all_pages);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
