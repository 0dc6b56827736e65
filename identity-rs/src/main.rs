use identity_rs::api::handlers::AppState;
use identity_rs::api::ApiServer;
use identity_rs::config::Config;
use identity_rs::dns::{RecordGenerator, SystemResolver};
use identity_rs::settings::SettingsStore;
use identity_rs::verification::VerificationEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .pretty()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting identity-rs server");

    // Load configuration
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    info!("Configuration loaded");
    info!("  API listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.storage.database_url);
    info!("  Default provider: {}", config.email.default_provider);
    info!("  DNS lookup timeout: {}s", config.email.dns_timeout_secs);

    let store = SettingsStore::new(
        &config.storage.database_url,
        &config.email.default_provider,
    )
    .await?;

    let generator = RecordGenerator::new(
        config.email.spf_includes.clone(),
        config.email.default_provider.clone(),
        config.email.dmarc_report_address.clone(),
    );

    let resolver = Arc::new(SystemResolver::new(Duration::from_secs(
        config.email.dns_timeout_secs,
    )));

    let engine = VerificationEngine::new(store.clone(), resolver, generator.clone());

    let state = AppState {
        store,
        engine,
        generator,
    };

    let server = ApiServer::new(state, config.server.listen_addr.clone());
    server.run().await?;

    Ok(())
}
