#![forbid(unsafe_code)]

//! labdesk: client library and CLI for a laboratory asset management backend.
//!
//! Every management screen of the backend follows one pattern, and this crate
//! implements it once:
//! 1. **Query state**: page, size, keyword, filters and sort for one list
//! 2. **Debounced fetcher**: bursts of edits collapse into one request, and only
//!    the latest-issued response is ever applied
//! 3. **Mutation then refetch**: create/update/delete/duplicate, an alert, and a
//!    reload of the current page
//! 4. **Incremental selection**: type-ahead pickers that append pages without
//!    duplicates
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use labdesk::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use labdesk::core::config::Config;
//! use labdesk::resources::service::ResourceService;
//! ```

pub mod prelude;

pub mod api;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod dashboard;
pub mod logger;
pub mod query;
pub mod resources;
pub mod ui;
