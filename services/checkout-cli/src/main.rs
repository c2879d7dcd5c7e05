//! LearnHub checkout client
//!
//! Single-binary client that:
//! 1. Keeps the learner's credential in a durable or ephemeral scope
//! 2. Sends authenticated requests, refreshing the credential on 401
//! 3. Watches a pending payment until it settles or the window runs out

mod config;
mod metrics;
mod navigation;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_client::{ApiClient, ApiClientConfig};
use payment::{ApiStatusSource, PaymentPipeline, PaymentSnapshot, PaymentStatus};
use session_store::{CredentialStore, Scope};
use transport::{HttpTransport, RequestDescriptor};

use crate::config::Config;
use crate::navigation::{ConsoleLoginNavigator, ConsoleResultNavigator};

/// Exit code when a payment session was closed before it settled.
const EXIT_UNSETTLED: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "learnhub", version, about = "LearnHub session and checkout client")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store an access token
    Login {
        #[arg(long)]
        token: String,
        /// Keep the token for this process only instead of persisting it
        #[arg(long)]
        ephemeral: bool,
    },
    /// Forget the stored access token
    Logout,
    /// Authenticated GET against the backend
    Get { path: String },
    /// Wait for a pending payment to settle
    Pay {
        order_code: String,
        /// Override the configured payment window, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    let config_path = Config::resolve_path(cli.config.as_deref());
    debug!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        durable_file = config.session.credential_file.is_some(),
        "configuration loaded"
    );

    let client = build_client(&config)?;

    let code = match cli.command {
        Command::Login { token, ephemeral } => {
            let scope = if ephemeral {
                Scope::Ephemeral
            } else {
                Scope::Durable
            };
            if token.trim().is_empty() {
                anyhow::bail!("refusing to store an empty token");
            }
            client.login(token.trim(), scope);
            if scope == Scope::Ephemeral {
                warn!("ephemeral credential only lives until this process exits");
            }
            println!("signed in ({scope})");
            ExitCode::SUCCESS
        }
        Command::Logout => {
            client.logout();
            println!("signed out");
            ExitCode::SUCCESS
        }
        Command::Get { path } => run_get(&client, &path).await?,
        Command::Pay {
            order_code,
            timeout,
        } => run_pay(&client, &config, order_code, timeout.map(Duration::from_secs)).await?,
    };

    debug!(metrics = %prometheus_handle.render(), "final metrics");
    Ok(code)
}

fn build_client(config: &Config) -> Result<ApiClient> {
    let store = Arc::new(match &config.session.credential_file {
        Some(path) => CredentialStore::with_durable_file(path.clone()),
        None => CredentialStore::in_memory(),
    });

    // The env token is a fallback; seeding over a stored credential would
    // wipe the other scope.
    if let Some(token) = &config.seed_token {
        if store.read().is_none() {
            store.write(token.expose(), Scope::Ephemeral);
            info!("seeded ephemeral credential from {}", config::TOKEN_ENV);
        } else {
            debug!("stored credential present, ignoring {}", config::TOKEN_ENV);
        }
    }

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = HttpTransport::new(http, config.api.base_url.clone(), config.api_timeout());

    Ok(ApiClient::new(
        Arc::new(transport),
        store,
        Arc::new(ConsoleLoginNavigator),
        ApiClientConfig {
            refresh_path: config.api.refresh_path.clone(),
        },
    ))
}

async fn run_get(client: &ApiClient, path: &str) -> Result<ExitCode> {
    let response = client
        .send(RequestDescriptor::get(path))
        .await
        .with_context(|| format!("GET {path} failed"))?;

    println!("{}", response.status);
    println!("{}", response.text());

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_pay(
    client: &ApiClient,
    config: &Config,
    order_code: String,
    timeout: Option<Duration>,
) -> Result<ExitCode> {
    if timeout.is_some_and(|t| t.is_zero()) {
        anyhow::bail!("--timeout must be greater than 0");
    }

    let source = ApiStatusSource::new(client.clone(), config.payment.status_path.clone());
    let pipeline = PaymentPipeline::new(
        Arc::new(source),
        Arc::new(ConsoleResultNavigator),
        config.payment_config(),
    );
    let handle = pipeline.open(order_code, timeout);
    let mut updates = handle.subscribe();
    print_progress(&updates.borrow_and_update());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_progress(&snapshot);
                if snapshot.is_settled() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!(order_code = handle.order_code(), "interrupted, closing payment session");
                handle.close();
                break;
            }
        }
    }

    handle.shutdown().await;
    let snapshot = handle.snapshot();
    if let Err(e) = snapshot.status.into_result(&snapshot.order_code) {
        if snapshot.status.is_terminal() {
            eprintln!("{e}");
        }
    }
    Ok(ExitCode::from(exit_code(&snapshot)))
}

fn print_progress(snapshot: &PaymentSnapshot) {
    if snapshot.status == PaymentStatus::Awaiting && !snapshot.closed {
        println!(
            "order {}: awaiting payment, {}s remaining",
            snapshot.order_code, snapshot.remaining_secs
        );
    }
}

fn exit_code(snapshot: &PaymentSnapshot) -> u8 {
    match snapshot.status {
        PaymentStatus::Paid => 0,
        PaymentStatus::Failed => 1,
        PaymentStatus::Expired => 2,
        PaymentStatus::Awaiting => EXIT_UNSETTLED,
    }
}
