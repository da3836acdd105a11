//! Terminal presentation helpers used by the `labdesk` binary.
#![allow(missing_docs)]

pub mod table;

use colored::Colorize;

use crate::ui::alerts::{Alert, AlertLevel};

/// One alert as a single colored line.
#[must_use]
pub fn alert_line(alert: &Alert) -> String {
    let tag = match alert.level {
        AlertLevel::Info => "info".blue(),
        AlertLevel::Success => "ok".green(),
        AlertLevel::Warning => "warn".yellow(),
        AlertLevel::Error => "error".red(),
    };
    format!("[{tag}] {}", alert.message)
}
