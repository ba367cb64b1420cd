//! Plain-text rendering of prediction rows.

use crate::task::Record;
use crate::task::rows::{cell_text, union_columns};

const SEPARATOR: &str = "  ";

/// Renders rows as a right-aligned table with a leading row index.
///
/// Columns appear in first-seen order. A row missing a column shows an
/// empty cell.
pub(crate) fn render(rows: &[Record]) -> String {
    if rows.is_empty() {
        return "(no rows)\n".to_string();
    }

    let columns = union_columns(rows);

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let index_width = (rows.len() - 1).to_string().len();

    let mut out = String::new();
    out.push_str(&" ".repeat(index_width));
    for (column, width) in columns.iter().zip(&widths) {
        out.push_str(SEPARATOR);
        out.push_str(&format!("{:>width$}", column, width = *width));
    }
    out.push('\n');

    for (index, row) in cells.iter().enumerate() {
        out.push_str(&format!("{:>width$}", index, width = index_width));
        for (cell, width) in row.iter().zip(&widths) {
            out.push_str(SEPARATOR);
            out.push_str(&format!("{:>width$}", cell, width = *width));
        }
        out.push('\n');
    }
    out
}
