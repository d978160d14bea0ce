//! Command-line entry point.
//!
//! ```bash
//! # Periodic mode: run now, then every POLL_INTERVAL_HOURS until Ctrl+C
//! effective-balance
//!
//! # One run, non-zero exit status on failure
//! effective-balance --once
//!
//! # One-time OAuth consent, writes the credential file
//! effective-balance authorize --client-id ID --client-secret SECRET --output token.json
//! ```
//!
//! Log levels are controlled with `RUST_LOG` (default `effective_balance=info`).

use chrono::Utc;
use clap::{Parser, Subcommand};
use effective_balance::{
    oauth, AppConfig, GmailSessionProvider, Pipeline, RunOutcome, SmtpNotifier,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "effective-balance", version, about)]
struct Cli {
    /// Perform a single run and exit.
    #[arg(long)]
    once: bool,

    /// Load environment variables from this file instead of `./.env`.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the OAuth consent flow once and store the resulting credential.
    Authorize {
        /// OAuth client id.
        #[arg(long, env = "OAUTH_CLIENT_ID")]
        client_id: String,

        /// OAuth client secret.
        #[arg(long, env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,

        /// Where to write the credential JSON.
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Redirect URI registered for the client.
        #[arg(long, default_value = "http://localhost")]
        redirect_uri: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("effective_balance=info")),
        )
        .with_target(true)
        .init();

    load_env(cli.env_file.as_deref());

    let result = match cli.command {
        Some(Command::Authorize {
            client_id,
            client_secret,
            output,
            redirect_uri,
        }) => authorize(&client_id, &client_secret, &output, &redirect_uri).await,
        None => run(cli.once).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, category = %e.category(), "Exiting with failure");
            ExitCode::FAILURE
        }
    }
}

fn load_env(path: Option<&std::path::Path>) {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => info!(env_file = %path.display(), "Running in dev mode"),
        Err(_) => info!("No env file, running in prod mode"),
    }
}

async fn run(once: bool) -> effective_balance::Result<()> {
    let config = AppConfig::from_env()?;

    info!(
        email = %config.mail.address(),
        imap = %config.mail.server_address(),
        bank_a = %config.bank_a.label,
        bank_b = %config.bank_b.label,
        recency_days = config.schedule.recency_days,
        "Configuration loaded"
    );

    let provider = GmailSessionProvider::new(&config)?;
    let notifier = SmtpNotifier::new(&config.smtp, &config.timeouts)?;
    let pipeline = Pipeline::new(provider, notifier, (&config).into());

    if once {
        match pipeline.run_once().await? {
            RunOutcome::Sent(balance) => info!(effective = %balance, "Run complete"),
            RunOutcome::Skipped { sender_label } => info!(bank = %sender_label, "Run skipped"),
        }
        return Ok(());
    }

    pipeline
        .run_periodic(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

async fn authorize(
    client_id: &str,
    client_secret: &str,
    output: &std::path::Path,
    redirect_uri: &str,
) -> effective_balance::Result<()> {
    let url = oauth::consent_url(client_id, redirect_uri)?;
    println!("Open this URL in a browser and grant access:\n\n{url}\n");
    println!("Paste the `code` parameter from the redirect URL:");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let code = match lines.next_line().await {
        Ok(Some(line)) if !line.trim().is_empty() => line.trim().to_string(),
        Ok(_) => {
            return Err(effective_balance::Error::InvalidConfig {
                message: "no authorization code entered".into(),
            })
        }
        Err(source) => {
            return Err(effective_balance::Error::CredentialFile {
                path: PathBuf::from("<stdin>"),
                source,
            })
        }
    };

    let http = reqwest::Client::new();
    let creds =
        oauth::exchange_code(&http, client_id, client_secret, &code, redirect_uri, Utc::now())
            .await?;

    tokio::fs::write(output, creds.to_json()?)
        .await
        .map_err(|source| effective_balance::Error::CredentialFile {
            path: output.to_path_buf(),
            source,
        })?;

    info!(path = %output.display(), "Credential stored");
    println!("Stored credential in {}", output.display());
    Ok(())
}
