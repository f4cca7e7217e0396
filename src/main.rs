use anyhow::{Context, Result};
use tokio::signal;

use event_mailer::config::Settings;
use event_mailer::telemetry::init_telemetry;
use event_mailer::template::TemplatesDefinition;
use event_mailer::Mailer;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    init_telemetry(&settings.log)?;
    tracing::info!(service = %settings.service.full_name(), "Configuration loaded");

    // Load template definitions
    let templates_path = settings.templates.config_path.clone();
    let definition = TemplatesDefinition::from_file(&templates_path)
        .with_context(|| format!("Failed to load templates from {}", templates_path.display()))?;

    let mailer = Mailer::from_settings(settings, definition)?;
    tracing::info!("Mailer initialized");

    tokio::spawn(shutdown_signal_handler(mailer.shutdown_signal()));

    // Connection or channel failures end the process with a non-zero exit code
    mailer.run().await?;

    tracing::info!("Mailer shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping consumer");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping consumer");
        }
    }

    let _ = shutdown_tx.send(());
}
