//! Remote spreadsheet access and row synchronization.

pub mod google;
pub mod position;
pub mod retry;
pub mod synchronizer;

use async_trait::async_trait;

use crate::error::SheetError;
use crate::model::CellValue;

pub use google::GoogleSheetClient;
pub use position::{CellPosition, ColumnLayout, column_letters};
pub use retry::{Delay, RetryPolicy, TokioDelay, update_with_backoff};
pub use synchronizer::SheetSynchronizer;

/// A single worksheet that can be read in full and written cell by cell.
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Every row of the worksheet as displayed strings.
    async fn read_all(&self) -> Result<Vec<Vec<String>>, SheetError>;

    /// Overwrite one cell addressed in A1 notation.
    async fn update_cell(&self, a1: &str, value: &CellValue) -> Result<(), SheetError>;
}

/// Number of rows that have at least one non-empty cell.
pub fn count_non_blank(rows: &[Vec<String>]) -> usize {
    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_rows_counted() {
        let rows = vec![
            vec!["date".to_string(), "name".to_string()],
            vec![String::new(), String::new()],
            vec![],
            vec![String::new(), "x".to_string()],
        ];
        assert_eq!(count_non_blank(&rows), 2);
        assert_eq!(count_non_blank(&[]), 0);
    }
}
