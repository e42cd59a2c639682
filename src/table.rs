//! Plain-text tables for terminal previews.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Cells longer than this are cut and suffixed with `...`.
pub const MAX_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    if column_count == 0 {
        return String::new();
    }

    let cell = |row: &[String], idx: usize| -> String {
        row.get(idx)
            .map(|value| clip(&flatten(value)).into_owned())
            .unwrap_or_default()
    };
    let header_cells = (0..column_count)
        .map(|idx| cell(headers, idx))
        .collect::<Vec<_>>();
    let body = rows
        .iter()
        .map(|row| (0..column_count).map(|idx| cell(row, idx)).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = header_cells
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in &body {
        for (idx, value) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(value.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in &body {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn clip(value: &str) -> Cow<'_, str> {
    if value.chars().count() <= MAX_CELL_WIDTH {
        return Cow::Borrowed(value);
    }
    let kept: String = value.chars().take(MAX_CELL_WIDTH - 3).collect();
    Cow::Owned(format!("{kept}..."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn aligns_columns_and_pads_short_rows() {
        let rendered = render_table(
            &strings(&["VIN", "Make"]),
            &[strings(&["1FA", "Ford"]), strings(&["K"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "VIN  Make");
        assert_eq!(lines[1], "---  ----");
        assert_eq!(lines[2], "1FA  Ford");
        assert_eq!(lines[3], "K");
    }

    #[test]
    fn long_and_multiline_cells_are_flattened() {
        let long = "x".repeat(60);
        let rendered = render_table(&strings(&["Notes"]), &[vec![long], strings(&["a\nb"])]);
        assert!(rendered.contains(&format!("{}...", "x".repeat(MAX_CELL_WIDTH - 3))));
        assert!(rendered.contains("a b"));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render_table(&[], &[]), "");
    }
}
