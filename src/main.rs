use color_eyre::eyre::WrapErr;
use tokio::{fs::File, io::BufWriter};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use urlpack::config;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
    color_eyre::install()?;

    let config = config::config();

    // Usage errors surface before any file or network activity
    let items = config
        .source_items()
        .await
        .wrap_err("Failed to read input list")?;
    let output = config.validate(&items)?;

    let mut archiver = config.archiver();
    archiver.add_items(items);

    let token = archiver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            token.cancel();
        }
    });

    tracing::info!(items = archiver.len(), output = ?output, "Creating archive");
    let file = File::create(&output)
        .await
        .wrap_err_with(|| format!("Failed to create {}", output.display()))?;

    let report = match archiver.create_archive(BufWriter::new(file)).await {
        Ok(report) => report,
        Err(e) => {
            // An interrupted archive is not usable
            if let Err(remove_err) = tokio::fs::remove_file(&output).await {
                tracing::debug!(error = %remove_err, "Failed to remove incomplete archive");
            }
            return Err(e.into());
        }
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        output = ?output,
        "Done"
    );
    Ok(())
}
