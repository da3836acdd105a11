//! Sort allow-lists, coercion to a default, and header click cycles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sort direction as the backend spells it (`sortOrder=asc|desc`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Parse `asc`/`desc` case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single active sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    #[must_use]
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Fields a list endpoint accepts for `sortBy`, plus the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPolicy {
    allowed: &'static [&'static str],
    default_field: &'static str,
    default_direction: SortDirection,
}

impl SortPolicy {
    #[must_use]
    pub const fn new(
        allowed: &'static [&'static str],
        default_field: &'static str,
        default_direction: SortDirection,
    ) -> Self {
        Self {
            allowed,
            default_field,
            default_direction,
        }
    }

    #[must_use]
    pub const fn allowed(&self) -> &'static [&'static str] {
        self.allowed
    }

    #[must_use]
    pub fn allows(&self, field: &str) -> bool {
        self.allowed.contains(&field)
    }

    #[must_use]
    pub fn default_spec(&self) -> SortSpec {
        SortSpec::new(self.default_field, self.default_direction)
    }

    /// The sort actually sent to the server.
    ///
    /// An unknown field, or no sort at all, becomes the default field *and*
    /// direction; the requested direction is not carried over.
    #[must_use]
    pub fn coerce(&self, requested: Option<&SortSpec>) -> SortSpec {
        match requested {
            Some(spec) if self.allows(&spec.field) => spec.clone(),
            _ => self.default_spec(),
        }
    }
}

/// How repeated clicks on a column header move through sort states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortCycle {
    /// unsorted → asc → desc → unsorted
    #[default]
    TriState,
    /// asc → desc → asc
    TwoState,
}

impl SortCycle {
    /// Next sort after a click on `field`. A click on a different field
    /// always starts at ascending.
    #[must_use]
    pub fn next(self, current: Option<&SortSpec>, field: &str) -> Option<SortSpec> {
        match current {
            Some(spec) if spec.field == field => match (self, spec.direction) {
                (_, SortDirection::Asc) => Some(SortSpec::desc(field)),
                (Self::TriState, SortDirection::Desc) => None,
                (Self::TwoState, SortDirection::Desc) => Some(SortSpec::asc(field)),
            },
            _ => Some(SortSpec::asc(field)),
        }
    }
}
