//! Optional append-only diagnostic file for migration summaries.

use crate::config::DebugSinkConfig;
use crate::migration::stats::MigrationSummary;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append the rendered summary to the configured file.
pub async fn append_summary(
    config: &DebugSinkConfig,
    summary: &MigrationSummary,
) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)
        .await?;

    file.write_all(summary.to_string().as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Write the summary if the sink is enabled. Failures are logged and dropped.
pub async fn emit(config: &DebugSinkConfig, summary: &MigrationSummary) {
    if !config.enabled {
        return;
    }

    match append_summary(config, summary).await {
        Ok(()) => log::debug!(
            "{}: migration summary written to {}",
            summary.user,
            config.path.display()
        ),
        Err(err) => log::warn!(
            "{}: could not write migration summary to {}: {}",
            summary.user,
            config.path.display(),
            err
        ),
    }
}
