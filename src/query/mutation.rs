//! Mutation kinds and what happens to the list afterwards.
//!
//! Every successful mutation is followed by a refetch of the current query. The
//! only per-kind choice is whether that refetch stays on the current page or
//! returns to the first one.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::config::GridConfig;
use crate::core::errors::{LabError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Duplicate,
}

impl MutationKind {
    pub const ALL: [Self; 4] = [Self::Create, Self::Update, Self::Delete, Self::Duplicate];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Duplicate => "duplicate",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| {
                LabError::validation(
                    "mutation kind",
                    format!("{raw:?} is not one of create, update, delete, duplicate"),
                )
            })
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the list goes after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchTarget {
    KeepPage,
    FirstPage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefetchPolicy {
    reset_after: BTreeSet<MutationKind>,
}

impl RefetchPolicy {
    /// Every mutation keeps the current page.
    #[must_use]
    pub fn keep_page() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reset_after<I: IntoIterator<Item = MutationKind>>(kinds: I) -> Self {
        Self {
            reset_after: kinds.into_iter().collect(),
        }
    }

    /// From `[grid] reset_page_after`. Names were checked by config validation.
    pub fn from_config(grid: &GridConfig) -> Result<Self> {
        let kinds = grid
            .reset_page_after
            .iter()
            .map(|name| MutationKind::parse(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::reset_after(kinds))
    }

    #[must_use]
    pub fn target(&self, kind: MutationKind) -> RefetchTarget {
        if self.reset_after.contains(&kind) {
            RefetchTarget::FirstPage
        } else {
            RefetchTarget::KeepPage
        }
    }
}
