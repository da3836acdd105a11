//! Plain-text tables sized to the terminal.

use colored::Colorize;
use crossterm::terminal;

const DEFAULT_WIDTH: usize = 100;
const MIN_COLUMN: usize = 4;
const GAP: usize = 2;

/// Terminal columns, or a fixed width when stdout is not a terminal.
#[must_use]
pub fn terminal_width() -> usize {
    terminal::size().map_or(DEFAULT_WIDTH, |(cols, _)| usize::from(cols).max(20))
}

/// Render a header row plus `rows`, shrinking the widest columns until the
/// table fits in `width`. Cells that no longer fit end with `…`.
#[must_use]
pub fn render(headers: &[&str], rows: &[Vec<String>], width: usize) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    fit(&mut widths, width.saturating_sub(GAP * columns.saturating_sub(1)));

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    out.push_str(&format_row(&header, &widths).bold().to_string());
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row, &widths));
        out.push('\n');
    }
    out
}

fn fit(widths: &mut [usize], budget: usize) {
    while widths.iter().sum::<usize>() > budget {
        let Some((widest, &w)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
            return;
        };
        if w <= MIN_COLUMN {
            return;
        }
        widths[widest] = w - 1;
    }
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let parts: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let cell = cells.get(i).map_or("", String::as_str);
            format!("{:<w$}", truncate(cell, w))
        })
        .collect();
    parts.join(&" ".repeat(GAP)).trim_end().to_string()
}

#[must_use]
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(width - 1).collect();
    cut.push('…');
    cut
}
