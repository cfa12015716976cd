use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lethex::app::App;
use lethex::auth::AuthState;
use lethex::config::{default_config_path, ResolvedConfig};
use lethex::duration::format_duration;
use lethex::models::{Holder, Identity, Role};
use lethex::routing::{decide, AccessContext};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "lethex")]
#[command(about = "Fund portfolio valuation and access gate")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Holder,
    User,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Admin => Role::Admin,
            RoleArg::Holder => Role::Holder,
            RoleArg::User => Role::User,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,
    /// Fetch spot prices for every registered token once
    Prices,
    /// Evaluate the route gate for a path without touching the backend
    Route {
        path: String,
        /// Signed-in role; omit for signed out
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
        /// Pretend a holder session is present
        #[arg(long)]
        holder: bool,
        /// Pretend identity resolution is still running
        #[arg(long)]
        resolving: bool,
    },
    /// Log in with an access code and follow prices and totals until Ctrl-C
    Watch {
        #[arg(long)]
        access_code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    match cli.command {
        Command::Config => {
            let output = json!({
                "config_file": config.config_path.display().to_string(),
                "session_dir": config.session_dir.display().to_string(),
                "holder_key": config.holder_key,
                "backend_url": config.backend.url,
                "email_domain": config.backend.email_domain,
                "prices": {
                    "api_base_url": config.prices.api_base_url,
                    "freshness_window": format_duration(config.prices.freshness_window),
                    "poll_interval": format_duration(config.prices.poll_interval),
                    "fiat_conversion_rate": config.prices.fiat_conversion_rate,
                    "local_currency": config.prices.local_currency,
                },
                "static_tokens": config.tokens.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Prices => {
            let app = App::from_config(config)?;
            let store = app.store().clone();
            store.load_tokens().await?;
            store.update_prices().await;

            let mut prices: Vec<_> = store.prices().into_values().collect();
            prices.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            println!("{}", serde_json::to_string_pretty(&prices)?);
        }
        Command::Route {
            path,
            role,
            holder,
            resolving,
        } => {
            let auth = if resolving {
                AuthState::resolving()
            } else {
                AuthState::settled(role.map(|role| Identity::new("cli", role.into())))
            };
            let holder = holder.then(|| Holder::new("cli", "CLI holder"));
            let decision = decide(&AccessContext::new(auth, holder), &path);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::Watch { access_code } => {
            let mut app = App::from_config(config)?;
            app.start().await;

            let outcome = app.login(&access_code).await.context("Login failed")?;
            info!(home = outcome.home(), "logged in");

            watch_totals(app.store().clone()).await?;
            app.shutdown().await;
        }
    }

    Ok(())
}

/// Print the totals each time they change, until Ctrl-C.
async fn watch_totals(store: Arc<lethex::store::AppStore>) -> Result<()> {
    let mut rx = store.subscribe();
    let mut last = None;
    loop {
        let totals = rx.borrow_and_update().totals;
        if last != Some(totals) {
            println!("{}", serde_json::to_string(&totals)?);
            last = Some(totals);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
