//! End-to-end run: collect → stage → decode → synchronize.

use chrono::Local;
use tracing::info;

use crate::config::Config;
use crate::decoder::AttachmentDecoder;
use crate::error::{Error, Result};
use crate::mail::{self, Collection};
use crate::sheets::synchronizer::SyncReport;
use crate::sheets::{Delay, GoogleSheetClient, SheetClient, SheetSynchronizer};
use crate::staging;

/// Decode a successful collection and append it to the worksheet.
///
/// Returns `None` without touching the sheet when nothing was collected.
pub async fn process<C: SheetClient, D: Delay>(
    collection: &Collection,
    synchronizer: &mut SheetSynchronizer<C, D>,
) -> Result<Option<SyncReport>> {
    if !collection.succeeded() {
        info!("No pass requests collected; nothing to synchronize");
        return Ok(None);
    }

    let decoded = AttachmentDecoder::new().decode(&collection.staged)?;
    let report = synchronizer.synchronize(&decoded).await?;
    info!(
        start_row = report.start_row,
        inserted = report.ids.len(),
        "Synchronization finished"
    );
    Ok(Some(report))
}

/// Run the whole pipeline against the configured mailbox and spreadsheet.
///
/// The staging directory is removed once the run completes. A fatal error
/// leaves it, and anything already written remotely, as it was.
pub async fn run(config: &Config) -> Result<Option<SyncReport>> {
    staging::prepare(&[config.run.staging_dir.as_path(), config.run.output_dir.as_path()])?;

    let today = Local::now().date_naive();
    let mail_config = config.mail.clone();
    let collection = tokio::task::spawn_blocking(move || mail::collect(&mail_config, today))
        .await
        .map_err(|e| Error::Task(e.to_string()))??;
    staging::persist(&collection.staged, &config.run.staging_dir)?;

    let report = if collection.succeeded() {
        let client = GoogleSheetClient::connect(&config.sheet).await?;
        let mut synchronizer = SheetSynchronizer::new(client, &config.run);
        process(&collection, &mut synchronizer).await?
    } else {
        info!("No pass requests collected; skipping spreadsheet");
        None
    };

    staging::clear(&config.run.staging_dir)?;
    Ok(report)
}
