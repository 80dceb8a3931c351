//! Run one connector action and print the finished result as JSON.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use ciscota_core::{load_config, load_from_env, Action, Connector, LocalVault};
use clap::Parser;
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(name = "ciscota", about = "Run an appliance connector action")]
struct Cli {
    /// Action identifier, e.g. `list_endpoints`.
    action: String,

    /// Asset configuration file; the environment is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Action parameters as a JSON object.
    #[arg(long, conflicts_with = "params_file")]
    param: Option<String>,

    #[arg(long)]
    params_file: Option<PathBuf>,

    /// Register a local file in the vault, as `ID=PATH`. Repeatable.
    #[arg(long = "vault-file", value_name = "ID=PATH")]
    vault_files: Vec<String>,

    /// Print the page the action's view renders into instead of running it.
    #[arg(long)]
    template: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "ciscota_core=debug" } else { "ciscota_core=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_params(cli: &Cli) -> anyhow::Result<Map<String, Value>> {
    let raw = match (&cli.param, &cli.params_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("reading parameters from {}", path.display()))?,
        (None, None) => return Ok(Map::new()),
    };
    let value: Value = serde_json::from_str(&raw).context("parsing action parameters")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("action parameters must be a JSON object, got {other}"),
    }
}

fn build_vault(entries: &[String]) -> anyhow::Result<LocalVault> {
    entries.iter().try_fold(LocalVault::new(), |vault, entry| {
        let Some((id, path)) = entry.split_once('=') else {
            bail!("vault file {entry:?} is not ID=PATH");
        };
        Ok(vault.with_file(id, path))
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.template {
        let action: Action = cli.action.parse()?;
        println!("{}", ciscota_core::view::template_for(action));
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => load_from_env().context("loading configuration from the environment")?,
    };
    let params = read_params(&cli)?;
    let vault = build_vault(&cli.vault_files)?;

    let connector = Connector::new(config).with_vault(vault);
    let finished = connector.handle_action(&cli.action, params);

    println!("{}", serde_json::to_string_pretty(&finished)?);
    if !finished.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
