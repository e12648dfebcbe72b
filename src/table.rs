//! Plain-text rendering for listings: aligned columns, a dashed rule under the
//! header, control characters flattened to spaces.

use std::{borrow::Cow, fmt::Write as _};

pub const NULL_MARKER: &str = "NULL";

pub fn render_table<H, C>(headers: &[H], rows: &[Vec<C>]) -> String
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    let mut widths = headers
        .iter()
        .map(|header| display_width(header.as_ref()).max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell.as_ref()));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule = widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table<H, C>(headers: &[H], rows: &[Vec<C>])
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    print!("{}", render_table(headers, rows));
}

/// Table text for a nullable database value.
pub fn nullable(value: Option<&str>) -> &str {
    value.unwrap_or(NULL_MARKER)
}

fn format_row<C: AsRef<str>>(cells: &[C], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let text = flatten(cell.as_ref());
        let padding = width.saturating_sub(display_width(&text));
        line.push_str(&text);
        line.extend(std::iter::repeat_n(' ', padding));
    }
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(|ch: char| ch.is_control()) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if ch.is_control() { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}
