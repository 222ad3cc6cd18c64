mod config;
mod convert;
mod credentials;
mod cycle;
mod errors;
mod sink;
mod source;
mod token;

use crate::config::Config;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::cycle::{CycleReport, PollCycle};
use crate::sink::SinkClient;
use crate::source::SourceClient;
use crate::token::TokenManager;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,brew_forwarder=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn log_report(report: &CycleReport) {
    if let Some(err) = &report.aborted {
        tracing::error!(error = %err, "cycle aborted");
        return;
    }
    tracing::info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "cycle complete"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing()?;

    // One connection pool for the whole process; every outbound call shares
    // the same finite timeout.
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let store: Option<Box<dyn CredentialStore>> = config
        .credential_path
        .clone()
        .map(|path| Box::new(FileCredentialStore::new(path)) as Box<dyn CredentialStore>);

    let tokens = TokenManager::new(
        http.clone(),
        config.token_url.clone(),
        config.source_username.clone(),
        config.source_api_key.clone(),
        store,
    );
    let source = SourceClient::new(http.clone(), config.source_api_base.clone());
    let sink = SinkClient::new(http, config.sink_uri.clone());
    let cycle = PollCycle::new(tokens, source, sink);

    if config.run_once {
        log_report(&cycle.run().await);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    tracing::info!(
        interval_secs = config.poll_interval.as_secs(),
        "brew-forwarder polling started"
    );
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                log_report(&cycle.run().await);
            }
        }
    }

    Ok(())
}
