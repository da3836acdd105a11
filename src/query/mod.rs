//! The server-side list pattern shared by every management screen.
//!
//! A [`state::QueryState`] describes the page wanted; a [`fetcher::DebouncedFetcher`]
//! turns bursts of changes into one request and keeps only the newest answer;
//! [`grid::GridBinding`] ties both to a table and refetches after mutations;
//! [`selection::IncrementalSelection`] backs the type-ahead pickers.

pub mod fetcher;
pub mod grid;
pub mod mutation;
pub mod page;
pub mod selection;
pub mod sort;
pub mod state;
