//! A1 addressing and the fixed column layout.

use std::collections::HashMap;
use std::fmt;

use crate::model::Field;

/// Bijective base-26 column label: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_letters(col: u32) -> String {
    let mut label = Vec::new();
    let mut n = col as u64 + 1;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        label.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

/// A cell coordinate. The row is rendered as-is, with no +1 adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPosition {
    pub row: usize,
    pub col: u32,
}

impl CellPosition {
    pub fn new(row: usize, col: u32) -> Self {
        Self { row, col }
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row)
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Maps each semantic field to its column index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: HashMap<Field, u32>,
}

impl ColumnLayout {
    pub fn column(&self, field: Field) -> u32 {
        self.columns[&field]
    }

    /// Move a field to another column.
    pub fn with(mut self, field: Field, col: u32) -> Self {
        self.columns.insert(field, col);
        self
    }
}

impl Default for ColumnLayout {
    /// Date and personal fields in A..E, range in I, identity in J.
    fn default() -> Self {
        let columns = HashMap::from([
            (Field::Date, 0),
            (Field::Lastname, 1),
            (Field::Name, 2),
            (Field::Secondname, 3),
            (Field::Org, 4),
            (Field::Range, 8),
            (Field::Id, 9),
        ]);
        Self { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(9), "J");
        assert_eq!(column_letters(25), "Z");
    }

    #[test]
    fn double_letters_have_no_zero_digit() {
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(51), "AZ");
        assert_eq!(column_letters(52), "BA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn a1_uses_row_verbatim() {
        assert_eq!(CellPosition::new(12, 1).to_a1(), "B12");
        assert_eq!(CellPosition::new(0, 0).to_string(), "A0");
    }

    #[test]
    fn default_layout() {
        let layout = ColumnLayout::default();
        assert_eq!(layout.column(Field::Date), 0);
        assert_eq!(layout.column(Field::Org), 4);
        assert_eq!(layout.column(Field::Range), 8);
        assert_eq!(layout.column(Field::Id), 9);
        assert_eq!(layout.with(Field::Id, 12).column(Field::Id), 12);
    }
}
