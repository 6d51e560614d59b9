//! Domain types shared by the collection, decoding and synchronization stages.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Filename marker for single-visit pass requests.
pub const SINGLE_VISIT_MARKER: &str = "разовый пропуск";

/// Filename marker for permanent pass requests.
pub const PERMANENT_MARKER: &str = "постоянный пропуск";

/// Date format used for the date column (`19-Oct-2026`).
pub const DATE_FORMAT: &str = "%d-%b-%Y";

/// Category of a pass request, derived from the attachment filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    SingleVisit,
    Permanent,
}

impl PassKind {
    /// Classify a filename by marker containment, ignoring case.
    ///
    /// Returns `None` for files that carry neither marker.
    pub fn classify(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.contains(PERMANENT_MARKER) {
            Some(PassKind::Permanent)
        } else if lower.contains(SINGLE_VISIT_MARKER) {
            Some(PassKind::SingleVisit)
        } else {
            None
        }
    }
}

/// One visitor extracted from a row of a staged workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorRow {
    pub lastname: String,
    pub name: String,
    pub patronymic: String,
    pub organization: String,
    /// Validity range, only present for permanent pass rows.
    pub validity: Option<String>,
}

impl VisitorRow {
    pub fn new(
        lastname: impl Into<String>,
        name: impl Into<String>,
        patronymic: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            lastname: lastname.into(),
            name: name.into(),
            patronymic: patronymic.into(),
            organization: organization.into(),
            validity: None,
        }
    }

    pub fn with_validity(mut self, validity: impl Into<String>) -> Self {
        self.validity = Some(validity.into());
        self
    }

    /// Number of extracted fields: 4, or 5 with a validity range.
    pub fn field_count(&self) -> usize {
        if self.validity.is_some() { 5 } else { 4 }
    }
}

impl fmt::Display for VisitorRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.lastname, self.name, self.patronymic, self.organization
        )?;
        if let Some(validity) = &self.validity {
            write!(f, " [{validity}]")?;
        }
        Ok(())
    }
}

/// Semantic spreadsheet columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Lastname,
    Name,
    Secondname,
    Org,
    Id,
    Range,
}

/// A value written into a single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(u64),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        CellValue::Integer(value)
    }
}

/// A visitor row with its allocated identity, ready for insertion.
#[derive(Debug, Clone)]
pub struct VisitorRecord {
    pub row: VisitorRow,
    pub id: u64,
    pub date: NaiveDate,
}

impl VisitorRecord {
    /// Field map in write order: date, personal fields, identity, then range.
    pub fn fields(&self) -> Vec<(Field, CellValue)> {
        let mut fields = vec![
            (
                Field::Date,
                CellValue::Text(self.date.format(DATE_FORMAT).to_string()),
            ),
            (Field::Lastname, self.row.lastname.as_str().into()),
            (Field::Name, self.row.name.as_str().into()),
            (Field::Secondname, self.row.patronymic.as_str().into()),
            (Field::Org, self.row.organization.as_str().into()),
            (Field::Id, self.id.into()),
        ];
        if let Some(validity) = &self.row.validity {
            fields.push((Field::Range, validity.as_str().into()));
        }
        fields
    }
}
