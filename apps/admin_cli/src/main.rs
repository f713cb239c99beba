use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, load_settings_from, AdminClient, ListOptions, LoadOutcome};
use serde_json::Value;
use shared::protocol::{Filters, LoginRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to `admin_client.toml` in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Whoami,
    Logout,
    /// Fetches one page of `GET {api}/{resource}`.
    List {
        resource: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
        /// `key=value`; values that parse as JSON are sent typed.
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
}

fn parse_filter(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("filter '{raw}' must look like key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("filter '{raw}' has an empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_settings_from(Some(path.as_path()), |key| std::env::var(key).ok())?,
        None => load_settings()?,
    };
    let client = AdminClient::connect(settings).await?;
    let session = client.session();
    session.hydrate().await;

    match cli.command {
        Command::Login { email, password } => {
            let response = session.login(&LoginRequest { email, password }).await?;
            match response.message() {
                Some(message) => println!("{message}"),
                None if response.is_success() => println!("signed in"),
                None => println!("login failed"),
            }
            if !response.is_success() {
                bail!("login rejected");
            }
        }
        Command::Whoami => match session.user() {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
                let granted: Vec<&str> = session.permissions().iter().map(|p| p.as_str()).collect();
                println!("permissions: {}", granted.join(", "));
            }
            None => println!("not signed in"),
        },
        Command::Logout => {
            session.logout().await?;
            println!("signed out");
        }
        Command::List {
            resource,
            page,
            limit,
            filters,
        } => {
            if !session.is_authenticated() {
                bail!("not signed in; run `login` first");
            }
            let mut initial_filters = Filters::new();
            for raw in &filters {
                let (key, value) = parse_filter(raw)?;
                initial_filters.insert(key, value);
            }
            let list = client.list_with_options::<Value>(
                &resource,
                ListOptions {
                    initial_limit: limit.unwrap_or(client.settings().page_limit),
                    initial_filters,
                },
            );
            let outcome = if page > 1 {
                list.set_page(page).await
            } else {
                list.load().await
            };
            if let LoadOutcome::Failed(message) = outcome {
                bail!("listing {resource} failed: {message}");
            }

            let state = list.state();
            let pagination = state
                .pagination
                .context("list response carried no pagination")?;
            info!(resource = %resource, page = pagination.page, "page loaded");
            println!("{}", serde_json::to_string_pretty(&state.data)?);
            println!(
                "page {}/{} ({} total, {} per page)",
                pagination.page, pagination.total_pages, pagination.total, pagination.limit
            );
        }
    }

    Ok(())
}
