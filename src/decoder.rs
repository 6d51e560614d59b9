//! Turns staged workbooks into visitor rows.
//!
//! The first row of the first worksheet is a header; every following row
//! that is not entirely blank yields one `VisitorRow`. Columns are taken by
//! position only.

use std::io::Cursor;

use calamine::{Data, DataType, Range, Reader, open_workbook_auto_from_rs};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::model::{PassKind, VisitorRow};
use crate::staging::{StagedFile, StagingArea};

/// Lastname, first name, patronymic, organization. Column 3 is not used.
pub const PERSONAL_COLUMNS: [u32; 4] = [0, 1, 2, 4];

/// Projection used to pick up the validity range of permanent passes.
pub const VALIDITY_COLUMNS: [u32; 5] = [0, 1, 2, 4, 9];

/// Rows decoded from one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub filename: String,
    pub rows: Vec<VisitorRow>,
}

/// Reads workbooks out of a staging area.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttachmentDecoder;

impl AttachmentDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode every staged file, keeping staging order.
    pub fn decode(&self, staging: &StagingArea) -> Result<Vec<DecodedFile>, DecodeError> {
        staging.files().iter().map(|f| self.decode_file(f)).collect()
    }

    pub fn decode_file(&self, file: &StagedFile) -> Result<DecodedFile, DecodeError> {
        let personal = read_projection(file, &PERSONAL_COLUMNS)?;
        let mut rows: Vec<VisitorRow> = personal
            .into_iter()
            .map(|cells| {
                let mut cells = cells.into_iter();
                let mut next = || cells.next().unwrap_or_default();
                VisitorRow::new(next(), next(), next(), next())
            })
            .collect();

        if PassKind::classify(&file.filename) == Some(PassKind::Permanent) {
            let periods: Vec<String> = read_projection(file, &VALIDITY_COLUMNS)?
                .into_iter()
                .map(|mut cells| cells.pop().unwrap_or_default())
                .collect();

            if periods.len() != rows.len() {
                warn!(
                    filename = %file.filename,
                    rows = rows.len(),
                    periods = periods.len(),
                    "Row count mismatch between personal data and validity periods; truncating"
                );
            }
            rows = rows
                .into_iter()
                .zip(periods)
                .map(|(row, period)| row.with_validity(period))
                .collect();
        }

        debug!(filename = %file.filename, rows = rows.len(), "Decoded attachment");
        Ok(DecodedFile {
            filename: file.filename.clone(),
            rows,
        })
    }
}

/// Read the first worksheet of a staged file and project the given columns.
fn read_projection(file: &StagedFile, columns: &[u32]) -> Result<Vec<Vec<String>>, DecodeError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(file.bytes.clone())).map_err(|e| {
            DecodeError::Workbook {
                filename: file.filename.clone(),
                reason: e.to_string(),
            }
        })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DecodeError::NoWorksheet {
            filename: file.filename.clone(),
        })?
        .map_err(|e| DecodeError::Workbook {
            filename: file.filename.clone(),
            reason: e.to_string(),
        })?;

    Ok(project(&range, columns))
}

/// Data rows (everything below the header row) restricted to `columns`.
///
/// Rows with no value in any column of the sheet are dropped, so every
/// projection of the same range has the same rows.
pub fn project(range: &Range<Data>, columns: &[u32]) -> Vec<Vec<String>> {
    let (Some((header_row, first_col)), Some((last_row, last_col))) = (range.start(), range.end())
    else {
        return Vec::new();
    };

    (header_row + 1..=last_row)
        .filter(|&row| {
            (first_col..=last_col)
                .any(|col| !matches!(range.get_value((row, col)), None | Some(Data::Empty)))
        })
        .map(|row| {
            columns
                .iter()
                .map(|&col| range.get_value((row, col)).map(render).unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Cell text as read. Dates render as `YYYY-MM-DD HH:MM:SS`.
fn render(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    const HEADER: &[&str] = &[
        "Фамилия", "Имя", "Отчество", "Должность", "Организация", "", "", "", "", "Период",
    ];

    fn staged(filename: &str, rows: &[&[&str]]) -> StagedFile {
        StagedFile {
            filename: filename.to_string(),
            bytes: workbook(rows),
        }
    }

    #[test]
    fn single_visit_rows_have_four_fields() {
        let file = staged(
            "разовый пропуск.xlsx",
            &[
                HEADER,
                &["Иванов", "Иван", "Иванович", "инженер", "ООО Ромашка"],
                &["Петров", "Пётр", "Петрович", "техник", "АО Вектор"],
            ],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert_eq!(decoded.rows.len(), 2);
        assert!(decoded.rows.iter().all(|r| r.field_count() == 4));
        assert_eq!(
            decoded.rows[0],
            VisitorRow::new("Иванов", "Иван", "Иванович", "ООО Ромашка")
        );
    }

    #[test]
    fn permanent_rows_carry_validity() {
        let file = staged(
            "Постоянный пропуск отдел.xlsx",
            &[
                HEADER,
                &["Сидоров", "Семён", "Семёнович", "", "ЗАО Луч", "", "", "", "", "01.01-31.12"],
            ],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.rows[0].field_count(), 5);
        assert_eq!(decoded.rows[0].validity.as_deref(), Some("01.01-31.12"));
    }

    #[test]
    fn missing_cells_pass_through_empty() {
        let file = staged(
            "разовый пропуск.xlsx",
            &[HEADER, &["Кузнецов", "", "", "", ""]],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert_eq!(decoded.rows[0], VisitorRow::new("Кузнецов", "", "", ""));
    }

    #[test]
    fn header_only_sheet_yields_no_rows() {
        let file = staged("разовый пропуск.xlsx", &[HEADER]);
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert!(decoded.rows.is_empty());
    }

    #[test]
    fn garbage_bytes_fail() {
        let file = StagedFile {
            filename: "разовый пропуск.xlsx".into(),
            bytes: b"not a workbook".to_vec(),
        };
        let err = AttachmentDecoder::new().decode_file(&file).unwrap_err();
        assert!(matches!(err, DecodeError::Workbook { .. }));
    }

    #[test]
    fn decode_keeps_staging_order() {
        let mut area = StagingArea::new();
        area.stage("разовый пропуск b.xlsx", workbook(&[HEADER, &["Б", "", "", "", ""]]));
        area.stage("разовый пропуск a.xlsx", workbook(&[HEADER, &["А", "", "", "", ""]]));
        let decoded = AttachmentDecoder::new().decode(&area).unwrap();
        let names: Vec<_> = decoded.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["разовый пропуск b.xlsx", "разовый пропуск a.xlsx"]);
    }

    #[test]
    fn blank_rows_are_dropped() {
        let file = staged(
            "разовый пропуск.xlsx",
            &[
                HEADER,
                &["Иванов", "Иван", "", "", ""],
                &[],
                &["Петров", "Пётр", "", "", ""],
            ],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        let lastnames: Vec<_> = decoded.rows.iter().map(|r| r.lastname.as_str()).collect();
        assert_eq!(lastnames, ["Иванов", "Петров"]);
    }

    #[test]
    fn blank_rows_keep_validity_aligned() {
        let file = staged(
            "Постоянный пропуск.xlsx",
            &[
                HEADER,
                &["Сидоров", "", "", "", "", "", "", "", "", "01.01-31.03"],
                &[],
                &["Орлов", "", "", "", "", "", "", "", "", "01.04-30.06"],
            ],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[1].lastname, "Орлов");
        assert_eq!(decoded.rows[1].validity.as_deref(), Some("01.04-30.06"));
    }

    #[test]
    fn row_with_only_unprojected_value_is_kept() {
        let file = staged(
            "разовый пропуск.xlsx",
            &[HEADER, &["", "", "", "инженер", ""]],
        );
        let decoded = AttachmentDecoder::new().decode_file(&file).unwrap();
        assert_eq!(decoded.rows, vec![VisitorRow::new("", "", "", "")]);
    }
}
