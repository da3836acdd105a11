//! Generic CRUD over one [`Resource`] endpoint, plus wiring into grids and pickers.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::api::client::ApiClient;
use crate::api::request::{ApiResponse, Method};
use crate::core::config::Config;
use crate::core::errors::{LabError, Result};
use crate::logger::activity::ActivityEvent;
use crate::query::fetcher::FetchFn;
use crate::query::grid::{GridBinding, GridOptions};
use crate::query::mutation::RefetchPolicy;
use crate::query::page::Page;
use crate::query::selection::{EntityId, Identified, RemotePicker};
use crate::query::state::{FilterValue, PageSizePolicy, QueryState};
use crate::resources::models::{Asset, Resource};
use crate::ui::alerts::AlertCenter;
use crate::ui::i18n::{Catalog, Locale};

pub struct ResourceService<R: Resource> {
    client: ApiClient,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone())
    }
}

impl<R: Resource> ResourceService<R> {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            _resource: PhantomData,
        }
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// One page for `query`. Filters the endpoint does not know are rejected locally.
    pub fn list(&self, query: &QueryState) -> Result<Page<R>> {
        query.check_filters(R::FILTERS)?;
        self.client.list(R::PATH, query.to_query_params(&R::SORT))
    }

    pub fn get(&self, id: EntityId) -> Result<R> {
        self.client.get_json(&item_path::<R>(id), Vec::new())
    }

    /// Returns the stored entity when the backend echoes it.
    pub fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<Option<R>> {
        ensure_writable::<R>()?;
        let request = self
            .client
            .request(Method::Post, R::PATH)
            .with_body(serde_json::to_value(body)?);
        Ok(self.echoed(&self.client.execute(&request)?))
    }

    pub fn update<B: Serialize + ?Sized>(&self, id: EntityId, body: &B) -> Result<Option<R>> {
        ensure_writable::<R>()?;
        let request = self
            .client
            .request(Method::Put, item_path::<R>(id))
            .with_body(serde_json::to_value(body)?);
        Ok(self.echoed(&self.client.execute(&request)?))
    }

    pub fn delete(&self, id: EntityId) -> Result<()> {
        ensure_writable::<R>()?;
        self.client.delete(&item_path::<R>(id))
    }

    /// Number of rows matching one filter value, read from `totalElements` of a one-row page.
    pub fn count(&self, filter: Option<(&str, FilterValue)>) -> Result<u64> {
        let mut query = QueryState::new(&PageSizePolicy::fixed(1));
        if let Some((name, value)) = filter {
            query.set_filter(name, [value]);
        }
        Ok(self.list(&query)?.total_elements)
    }

    /// Mutation replies vary: the entity, a `{message}` body, or nothing.
    ///
    /// A body with an `id` that does not decode as `R` is logged and treated as
    /// no echo; the mutation itself still succeeded.
    fn echoed(&self, response: &ApiResponse) -> Option<R> {
        let body = response.decode::<Option<Value>>().ok().flatten()?;
        if body.get("id").is_none_or(Value::is_null) {
            return None;
        }
        match serde_json::from_value::<R>(body) {
            Ok(item) => (item.id() != 0).then_some(item),
            Err(error) => {
                let error = LabError::from(error);
                if let Some(activity) = self.client.activity() {
                    activity.send(ActivityEvent::Error {
                        code: error.code().to_string(),
                        message: format!("{} reply did not decode: {error}", R::NAME),
                    });
                }
                None
            }
        }
    }

    /// `list` as a fetch function for grids and pickers.
    #[must_use]
    pub fn fetch_fn(&self) -> FetchFn<R> {
        let service = self.clone();
        Arc::new(move |query: &QueryState| service.list(query))
    }

    pub fn grid(&self, options: GridOptions) -> Result<GridBinding<R>> {
        GridBinding::new(self.fetch_fn(), options)
    }

    pub fn picker(&self, config: &Config) -> Result<RemotePicker<R>> {
        RemotePicker::new(
            self.fetch_fn(),
            config.picker.page_size,
            Duration::from_millis(config.picker.debounce_ms),
            R::NAME,
            self.client.activity().cloned(),
        )
    }
}

impl ResourceService<Asset> {
    /// Server-side copy of an asset.
    pub fn duplicate(&self, id: EntityId) -> Result<Option<Asset>> {
        let request = self
            .client
            .request(Method::Post, format!("{}/duplicate", item_path::<Asset>(id)));
        Ok(self.echoed(&self.client.execute(&request)?))
    }
}

/// Grid settings for `R` taken from `[grid]` and `[ui]`.
pub fn grid_options<R: Resource>(
    config: &Config,
    alerts: Arc<AlertCenter>,
    client: &ApiClient,
) -> Result<GridOptions> {
    let mut options = GridOptions::new(R::NAME, R::SORT);
    options.page_sizes = PageSizePolicy::from_config(&config.grid);
    options.refetch = RefetchPolicy::from_config(&config.grid)?;
    options.debounce = Duration::from_millis(config.grid.debounce_ms);
    options.catalog = Catalog::new(Locale::resolve(&config.ui.locale));
    options.alerts = alerts;
    options.activity = client.activity().cloned();
    Ok(options)
}

fn item_path<R: Resource>(id: EntityId) -> String {
    format!("{}/{id}", R::PATH)
}

fn ensure_writable<R: Resource>() -> Result<()> {
    if R::WRITABLE {
        Ok(())
    } else {
        Err(LabError::validation(
            "resource",
            format!("{} records are read-only", R::NAME),
        ))
    }
}
