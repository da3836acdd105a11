//! User-facing feedback: alerts and localized strings.

pub mod alerts;
pub mod i18n;
