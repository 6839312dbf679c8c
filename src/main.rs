use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use email_waterfall::batch::{BatchReport, BatchRunner};
use email_waterfall::cli::{default_output_path, Cli, Commands};
use email_waterfall::config::{Config, OriginalFallback};
use email_waterfall::credentials::CredentialSet;
use email_waterfall::enrichment::Waterfall;
use email_waterfall::handlers::AppState;
use email_waterfall::records::ContactTable;
use email_waterfall::registry::ProviderRegistry;
use email_waterfall::server;

fn load_credentials(secrets: Option<&Path>) -> anyhow::Result<CredentialSet> {
    Ok(match secrets {
        Some(path) => CredentialSet::from_env_file(path)?,
        None => {
            let credentials = CredentialSet::from_process_env();
            tracing::info!(
                "Loaded {} provider credential(s) from the environment",
                credentials.len()
            );
            credentials
        }
    })
}

fn build_waterfall(config: &Config, secrets: Option<&Path>) -> anyhow::Result<Arc<Waterfall>> {
    let credentials = load_credentials(secrets)?;
    let registry = ProviderRegistry::from_credentials(&credentials, config)?;
    Ok(Arc::new(Waterfall::new(
        Arc::new(registry),
        config.original_fallback,
    )))
}

fn print_summary(report: &BatchReport, output: &Path) {
    let summary = &report.summary;
    println!();
    println!("{}", "=".repeat(50));
    println!("ENRICHMENT COMPLETE (run {})", report.run_id);
    println!("{}", "=".repeat(50));
    println!("Total contacts: {}", summary.total);
    println!(
        "Valid emails found: {} ({:.1}%)",
        summary.enriched,
        summary.success_rate * 100.0
    );
    for (source, count) in &summary.by_source {
        println!("  {}: {}", source, count);
    }
    if summary.failed > 0 {
        println!("Failed: {}", summary.failed);
        for (reason, count) in &summary.failure_reasons {
            println!("  {}: {}", reason, count);
        }
    }
    println!("Output: {}", output.display());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "email_waterfall=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Enrich {
            input,
            output,
            delay,
            secrets,
            limit,
            concurrency,
            retain_original,
        } => {
            if let Some(delay) = delay {
                config.contact_delay = delay;
            }
            if let Some(concurrency) = concurrency {
                if concurrency == 0 {
                    anyhow::bail!("--concurrency must be at least 1");
                }
                config.concurrency = concurrency;
            }
            if retain_original {
                config.original_fallback = OriginalFallback::Retain;
            }

            let waterfall = build_waterfall(&config, secrets.as_deref())?;

            let mut table = ContactTable::from_path(&input)?;
            if let Some(limit) = limit {
                table.truncate(limit);
            }
            tracing::info!("Loaded {} contacts from {}", table.len(), input.display());

            let runner = BatchRunner::new(waterfall, config.contact_delay, config.concurrency);
            let report = runner.run(table.contacts()).await;

            let output = output.unwrap_or_else(|| default_output_path(&input));
            table.write_enriched_to_path(&output, &report.outcomes)?;
            print_summary(&report, &output);
        }
        Commands::Serve { port, secrets } => {
            if let Some(port) = port {
                config.port = port;
            }

            let waterfall = build_waterfall(&config, secrets.as_deref())?;
            let port = config.port;
            let state = Arc::new(AppState::new(config, waterfall));

            server::serve(state, port).await?;
        }
    }

    Ok(())
}
