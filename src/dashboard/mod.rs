//! Dashboard: usage charts and headline counts.

pub mod summary;
pub mod usage;
