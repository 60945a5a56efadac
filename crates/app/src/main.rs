//! `sim` - session status and authenticated API calls from the terminal

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use sim_app::utils::logging::{init_tracing, LogFormat};
use sim_app::SessionContext;
use sim_infra::api::RequestOptions;
use sim_infra::config;

#[derive(Debug, Parser)]
#[command(name = "sim", version, about = "Session-aware API client")]
struct Cli {
    /// Config file (defaults to probing ./sim.toml, ./config.toml, ...)
    #[arg(long, global = true, env = "SIM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show configuration and authentication status
    Status,
    /// GET a path on the configured API and print the JSON payload
    Get {
        path: String,
        /// Query parameters as key=value
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Report whether a valid access token is available
    Token,
    /// End the session locally and at the identity provider
    Logout,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env())?;

    let cli = Cli::parse();
    let settings = match cli.config {
        Some(path) => config::apply_env_overrides(config::load_from_file(Some(path))?, |key| {
            std::env::var(key).ok()
        })?,
        None => config::load()?,
    };

    let context = SessionContext::new(settings).context("failed to build session context")?;
    let authenticated = context.init().await;

    let outcome = run(&context, cli.command, authenticated).await;
    context.close();
    outcome
}

async fn run(context: &SessionContext, command: Command, authenticated: bool) -> Result<()> {
    match command {
        Command::Status => {
            let identity = &context.config().identity;
            let missing = identity.missing_fields();
            if missing.is_empty() {
                println!("identity: configured ({})", identity.issuer_url.as_deref().unwrap_or_default());
            } else {
                println!("identity: not configured (missing {})", missing.join(", "));
            }
            println!("api: {}", context.api().base_url());
            println!("authenticated: {authenticated}");
            if !authenticated {
                if let Ok(url) = context.external().login_url(context.config().session.app_origin.as_deref()) {
                    println!("login: {url}");
                }
            }
        }
        Command::Get { path, query } => {
            let options = query
                .into_iter()
                .fold(RequestOptions::new(), |options, (key, value)| options.query(key, value));
            let payload: Value = context.api().get(&path, options).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Token => match context.get_token().await {
            Some(_) => println!("token: available"),
            None => println!("token: unavailable"),
        },
        Command::Logout => {
            context.logout().await?;
            println!("logged out");
        }
    }
    Ok(())
}
