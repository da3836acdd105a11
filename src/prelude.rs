//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use labdesk::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{LabError, Result};

// Transport
pub use crate::api::client::ApiClient;
pub use crate::api::request::{ApiRequest, ApiResponse, Method, RequestContext};
pub use crate::api::transport::{HttpTransport, Transport};

// Auth
pub use crate::auth::profile::{Profile, ProfileService, ProfileUpdate};
pub use crate::auth::session::{AuthService, LoginOutcome, Registration};
pub use crate::auth::tokens::{SessionTokens, TokenStore};

// Query pattern
pub use crate::query::fetcher::{DebouncedFetcher, FetchFn, FetchStatus};
pub use crate::query::grid::{GridBinding, GridOptions, GridOverlay, GridRow};
pub use crate::query::mutation::{MutationKind, RefetchPolicy};
pub use crate::query::page::Page;
pub use crate::query::selection::{EntityId, Identified, IncrementalSelection, RemotePicker};
pub use crate::query::sort::{SortCycle, SortDirection, SortPolicy, SortSpec};
pub use crate::query::state::{FilterValue, PageSizePolicy, QueryState};

// Resources
pub use crate::resources::media::MediaUploader;
pub use crate::resources::models::{
    Asset, Borrowing, Category, HistoryEntry, Location, Maintenance, Resource, ResourceKind, Room,
    Software, User,
};
pub use crate::resources::service::ResourceService;

// Dashboard
pub use crate::dashboard::summary::{DashboardService, DashboardSummary};
pub use crate::dashboard::usage::UsageChart;

// Feedback
pub use crate::ui::alerts::{Alert, AlertCenter, AlertLevel};
pub use crate::ui::i18n::{Catalog, Locale};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
