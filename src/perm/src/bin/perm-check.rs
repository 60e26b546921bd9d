//! # Permission Configuration Checker
//!
//! Loads a permission plugin configuration, installs the gate over an
//! in-memory entity store and prints the resulting route table. Given a
//! request file, dispatches it and prints the result or the denial.
//!
//! ```text
//! perm-check <config.json> [request.json]
//! ```
//!
//! The request file holds an action request object; a `perm$` field is the
//! attached permission. `RUST_LOG` controls log output (default: info).

use anyhow::{bail, Context};
use cretoai_perm::{
    ActionRequest, DispatcherBuilder, MemoryStore, PermConfig, PermError, PermPlugin,
    StoreHandler,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("CretoAI permission checker v{}", cretoai_perm::VERSION);

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        bail!("usage: perm-check <config.json> [request.json]");
    };
    let request_path = args.next();

    let config = PermConfig::from_path(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    info!("Configuration:");
    info!("  Denied status: {}", config.status.denied);
    info!("  Access control rules: {}", config.access_controls.len());
    info!("  Allow-lists: {}", config.allowed_properties.len());

    let store = Arc::new(MemoryStore::new());
    let mut builder = DispatcherBuilder::new();
    StoreHandler::register(&mut builder, store.clone());

    let plugin = PermPlugin::new(config, store)?;
    let dispatcher = plugin.install(builder)?;

    for pattern in dispatcher.patterns() {
        println!("{{{}}}", pattern);
    }

    let Some(request_path) = request_path else {
        return Ok(());
    };

    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("reading request from {}", request_path))?;
    let request = ActionRequest::from_value(serde_json::from_str(&raw)?)?;

    match dispatcher.act(request).await {
        Ok(out) => println!("{}", serde_json::to_string_pretty(&out)?),
        Err(PermError::Denied(denial)) => {
            error!("Denied: {}", denial);
            println!("{}", serde_json::to_string_pretty(&denial)?);
        }
        Err(err) => return Err(err.into()),
    }

    let metrics = plugin.metrics().snapshot();
    info!(
        "Forwarded: {}, denied: {}, transparent: {}",
        metrics.forwarded,
        metrics.total_denied(),
        metrics.transparent
    );

    Ok(())
}
