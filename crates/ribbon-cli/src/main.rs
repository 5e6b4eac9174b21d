//! # ribbon
//!
//! Command line front end for multi-relay NIP-58 badges:
//! - **accept** merges an awarded badge into your displayed badges, with a
//!   local snapshot before anything is published
//! - **define** publishes a badge definition unless it already exists
//! - **award** grants one of your badges to recipients
//!
//! Every publish is read back from each relay; only a read-back counts as
//! stored.

mod cli;
mod config;

use anyhow::bail;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ribbon_client::{
    award, publish_definition_if_missing, AcceptanceWorkflow, BadgeDefinition, DefinitionStatus,
};
use ribbon_net::summarize;
use ribbon_shared::{DefinitionReference, Signer};

use crate::cli::{Cli, Command};
use crate::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ribbon=debug")),
        )
        .init();

    // wss:// relays need a process-wide rustls provider; Err means one is already set.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let mut config = ClientConfig::from_env();
    if !cli.relays.is_empty() {
        config.relay_urls = cli.relays.clone();
    }
    info!(?config, "Loaded configuration");

    let keys = config.keys()?;
    let endpoints = config.endpoints();
    let npub = keys.public_key_npub()?;
    info!(
        pubkey = %keys.public_key_hex(),
        npub = %npub,
        relays = endpoints.len(),
        "Using identity"
    );
    println!("Identity: {npub}");

    // -----------------------------------------------------------------------
    // 3. Dispatch
    // -----------------------------------------------------------------------
    match cli.command {
        Command::Accept { definition, award } => {
            let store = config.backup_store()?;
            info!(path = %store.dir().display(), "Backup directory");

            let workflow = AcceptanceWorkflow::new(keys, endpoints, store)
                .with_config(config.workflow_config());
            let report = workflow.accept(&definition, &award).await;

            if let Some(summary) = report.summary() {
                println!("{summary}");
            }
            println!("{}", report.outcome);
            if report.outcome.is_failure() {
                bail!("badge acceptance {}", report.outcome.status());
            }
        }

        Command::Define {
            identifier,
            name,
            description,
            image,
            thumbs,
        } => {
            let definition = BadgeDefinition {
                identifier,
                name: Some(name),
                description,
                image,
                thumbs,
            };
            let reference = definition.reference(&keys.public_key_hex())?;

            let status =
                publish_definition_if_missing(&definition, &keys, &endpoints, config.fetch_window())
                    .await?;
            match &status {
                DefinitionStatus::Exists(record) => {
                    println!("Definition already published as {}", record.id);
                }
                DefinitionStatus::Published { outcomes, .. }
                | DefinitionStatus::PublishedUnverified { outcomes, .. } => {
                    println!("{}", summarize(outcomes));
                }
            }
            println!("Definition reference: {reference}");
        }

        Command::Award {
            identifier,
            recipients,
        } => {
            let reference = DefinitionReference::new(&keys.public_key_hex(), &identifier)?;
            let result = award(&reference, &recipients, &keys, &endpoints).await?;

            println!("{}", summarize(&result.outcomes));
            println!("Award id: {}", result.record.id);
            if !result.verified() {
                println!("Award published but not yet verified on any relay");
            }
        }
    }

    Ok(())
}
