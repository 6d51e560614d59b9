//! Appends decoded visitors to the worksheet and allocates their identities.

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use super::{
    CellPosition, ColumnLayout, Delay, RetryPolicy, SheetClient, TokioDelay, count_non_blank,
    update_with_backoff,
};
use crate::config::RunConfig;
use crate::credential::CredentialImageEmitter;
use crate::decoder::DecodedFile;
use crate::error::Result;
use crate::model::VisitorRecord;

/// Summary of one `synchronize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Row the first record was written to.
    pub start_row: usize,
    /// Identities allocated, in insertion order.
    pub ids: Vec<u64>,
}

/// Owns the identity counter and row pointer for a run.
///
/// The append row is computed once per call from a snapshot of the
/// worksheet and then advanced locally; nothing is read back.
pub struct SheetSynchronizer<C: SheetClient, D: Delay = TokioDelay> {
    client: C,
    delay: D,
    emitter: CredentialImageEmitter,
    columns: ColumnLayout,
    retry: RetryPolicy,
    next_id: u64,
    next_row: usize,
}

impl<C: SheetClient> SheetSynchronizer<C, TokioDelay> {
    pub fn new(client: C, run: &RunConfig) -> Self {
        Self::with_delay(client, TokioDelay, run)
    }
}

impl<C: SheetClient, D: Delay> SheetSynchronizer<C, D> {
    pub fn with_delay(client: C, delay: D, run: &RunConfig) -> Self {
        Self {
            client,
            delay,
            emitter: CredentialImageEmitter::new(&run.output_dir),
            columns: run.columns.clone(),
            retry: run.retry,
            next_id: run.id_seed,
            next_row: 0,
        }
    }

    /// Identity the next inserted row will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Append every decoded row, dated today.
    pub async fn synchronize(&mut self, decoded: &[DecodedFile]) -> Result<SyncReport> {
        self.synchronize_on(decoded, Local::now().date_naive()).await
    }

    /// Append every decoded row with an explicit date.
    pub async fn synchronize_on(
        &mut self,
        decoded: &[DecodedFile],
        date: NaiveDate,
    ) -> Result<SyncReport> {
        let snapshot = self.client.read_all().await?;
        self.next_row = count_non_blank(&snapshot);
        let mut report = SyncReport {
            start_row: self.next_row,
            ids: Vec::new(),
        };
        debug!(start_row = self.next_row, "Computed append start row");

        for file in decoded {
            debug!("Starting info from '{}'", file.filename);
            for row in &file.rows {
                let record = VisitorRecord {
                    row: row.clone(),
                    id: self.next_id,
                    date,
                };
                self.insert(&record).await?;
                info!(id = record.id, row = self.next_row, "Inserted entry: {}", record.row);

                report.ids.push(record.id);
                self.next_id += 1;
                self.next_row += 1;
            }
        }

        Ok(report)
    }

    /// Write each field of `record` to its column, then emit its credential.
    async fn insert(&self, record: &VisitorRecord) -> Result<()> {
        for (field, value) in record.fields() {
            let position = CellPosition::new(self.next_row, self.columns.column(field));
            update_with_backoff(&self.client, &self.delay, &self.retry, position, &value)
                .await?;
        }

        let path = self.emitter.path_for(&record.row.lastname);
        self.emitter.emit(&record.id.to_string(), &path)?;
        debug!("Created qr for '{}' id!", record.id);
        Ok(())
    }
}
