//! Adapter probe: issue one request through a configured upstream adapter

use anyhow::{bail, Context, Result};
use api_adapters::{AdapterManager, CancellationToken, ManagerConfig, RequestDescriptor};
use clap::Parser;
use reqwest::Method;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "adapter-probe", about = "Send one request through a resilient upstream adapter")]
struct Args {
    /// Adapter configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "ADAPTER_CONFIG")]
    config: PathBuf,

    /// Upstream name from the configuration
    #[arg(short, long)]
    upstream: String,

    /// Target URL
    #[arg(long)]
    url: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Header as key=value (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_key_value)]
    headers: Vec<(String, String)>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("api_adapters=info,adapter_probe=info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ManagerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let manager = AdapterManager::from_config(config).await?;

    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid method {}", args.method))?;
    let mut request = RequestDescriptor::new(method, args.url);
    request.params.extend(args.params);
    request.headers.extend(args.headers);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!(upstream = %args.upstream, "Sending probe request");
    let result = manager
        .execute_with_cancel(&args.upstream, &mut request, &cancel)
        .await;

    let health = manager.get_health(&args.upstream).await?;
    eprintln!("{}", serde_json::to_string_pretty(&health)?);

    match result {
        Ok(response) => {
            println!("{}", response.text());
            Ok(())
        }
        Err(e) => bail!("probe failed: {e}"),
    }
}
