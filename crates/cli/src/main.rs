use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kquery_api::{parse_query, query_pairs, ListResult, MemorySources, Query, Registry};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kqueryctl", version, about = "Filter, sort and page Kubernetes objects")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: all namespaces)
    #[arg(long = "ns", global = true, env = "KQUERY_NAMESPACE")]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List served resources and their scope
    Kinds,
    /// List objects through the query engine
    Ls {
        /// Resource name or kind; comma-separate several for one merged page
        resource: String,
        /// Query parameter, e.g. -p status=running -p sortBy=name -p limit=10
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Raw query string, e.g. "label=app=web&page=2&limit=20"
        #[arg(long = "query")]
        query: Option<String>,
    },
    /// Print one object as JSON
    Get {
        resource: String,
        name: String,
    },
}

fn init_tracing() {
    let env = std::env::var("KQUERY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KQUERY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KQUERY_METRICS_ADDR; expected host:port");
        }
    }
}

/// `--query` pairs first, then `-p` pairs. Paging and sort keys take their first
/// occurrence; a repeated filter key keeps its last value, so `-p` overrides `--query`.
fn build_query(query: Option<&str>, params: &[String]) -> Result<Query> {
    let mut pairs: Vec<(&str, &str)> = query_pairs(query.unwrap_or("")).collect();
    for p in params {
        let Some(pair) = p.split_once('=') else { bail!("invalid param {p:?}: expected KEY=VALUE") };
        pairs.push(pair);
    }
    Ok(parse_query(pairs))
}

fn render_age(created: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> String {
    let Some(ts) = created.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) else { return "-".to_string() };
    let mut secs = (now - ts.with_timezone(&chrono::Utc)).num_seconds().max(0);
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}

fn print_table(page: &ListResult<serde_json::Value>) {
    let now = chrono::Utc::now();
    println!("{:<16} {:<24} {:<40} {}", "NAMESPACE", "KIND", "NAME", "AGE");
    for v in &page.data {
        let meta = v.get("metadata");
        let field = |k: &str| meta.and_then(|m| m.get(k)).and_then(|v| v.as_str());
        let kind = v.get("kind").and_then(|k| k.as_str()).unwrap_or("-");
        println!(
            "{:<16} {:<24} {:<40} {}",
            field("namespace").unwrap_or("-"),
            kind,
            field("name").unwrap_or(""),
            render_age(field("creationTimestamp"), now)
        );
    }
    let p = page.pagination;
    println!("-- {} of {} (page {}, limit {})", page.data.len(), p.total, p.page, p.limit);
}

async fn run(cli: Cli) -> Result<()> {
    let ns = cli.namespace.as_deref();
    match cli.command {
        Commands::Kinds => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "kinds");
            // the resource table does not depend on the cluster
            let resources = Registry::from_sources(&MemorySources::new()).resources();
            match cli.output {
                Output::Human => {
                    for r in resources {
                        let scope = if r.namespaced { "namespaced" } else { "cluster" };
                        println!("{} • {} • {}", r.name, r.kind, scope);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&resources)?),
            }
        }
        Commands::Ls { resource, params, query } => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "ls");
            let q = build_query(query.as_deref(), &params)?;
            info!(resource = %resource, ns = ?ns, filters = q.filters.len(), "ls invoked");
            let t0 = Instant::now();
            let registry = Registry::with_client(kquery_kubehub::client().await?);
            let resources: Vec<&str> = resource.split(',').map(str::trim).filter(|r| !r.is_empty()).collect();
            let page = match resources.as_slice() {
                [] => bail!("no resource given"),
                [one] => registry.list(one, ns, &q).await?,
                many => registry.list_mixed(many, ns, &q).await?.try_map(|o| serde_json::to_value(&o))?,
            };
            info!(total = page.pagination.total, took_ms = %t0.elapsed().as_millis(), "ls done");
            match cli.output {
                Output::Human => print_table(&page),
                Output::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            }
        }
        Commands::Get { resource, name } => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "get");
            info!(resource = %resource, ns = ?ns, name = %name, "get invoked");
            let registry = Registry::with_client(kquery_kubehub::client().await?);
            let object = registry.get(&resource, ns, &name).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %format!("{e:#}"), "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_and_query_string_combine() {
        let q = build_query(Some("status=running&limit=5"), &["sortBy=name".into(), "label=app=web".into()]).unwrap();
        assert_eq!(q.sort_by.as_str(), "name");
        assert_eq!(q.pagination().limit, 5);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters["label"].as_str(), "app=web");
    }

    #[test]
    fn query_string_values_keep_their_equals_signs() {
        let q = build_query(Some("label=app=web&limit=5&limit=9"), &["status=running".into(), "label=tier=db".into()]).unwrap();
        assert_eq!(q.pagination().limit, 5);
        assert_eq!(q.filters["label"].as_str(), "tier=db");

        let q = build_query(Some("label=app=web"), &[]).unwrap();
        assert_eq!(q.filters["label"].as_str(), "app=web");
    }

    #[test]
    fn param_without_equals_is_rejected() {
        assert!(build_query(None, &["status".into()]).is_err());
    }

    #[test]
    fn age_is_compact() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-03-02T12:30:00Z").unwrap().with_timezone(&chrono::Utc);
        assert_eq!(render_age(Some("2024-03-01T10:00:00Z"), now), "1d2h");
        assert_eq!(render_age(Some("2024-03-02T12:29:30Z"), now), "30s");
        assert_eq!(render_age(None, now), "-");
    }

    #[test]
    fn cli_parses_ls_flags() {
        let cli = Cli::try_parse_from(["kqueryctl", "-o", "json", "ls", "pods", "--ns", "default", "-p", "nodeName=n1"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        assert_eq!(cli.namespace.as_deref(), Some("default"));
        assert!(matches!(cli.command, Commands::Ls { ref params, .. } if params == &["nodeName=n1".to_string()]));
    }
}
