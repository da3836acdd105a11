//! End-to-end behavior of grids and pickers against an in-memory backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, Row, signed_in_client};
use labdesk::query::grid::{GridBinding, GridOptions, GridOverlay};
use labdesk::query::mutation::MutationKind;
use labdesk::query::selection::{Identified, RemotePicker};
use labdesk::query::sort::SortSpec;
use labdesk::query::state::{FilterValue, QueryState};
use labdesk::resources::models::{Asset, Resource, User};
use labdesk::resources::service::ResourceService;
use labdesk::ui::alerts::{AlertCenter, AlertLevel};

const ASSETS: &str = "/admin/assets";
const USERS: &str = "/admin/users";
const SETTLE: Duration = Duration::from_secs(5);
const DEBOUNCE: Duration = Duration::from_millis(200);

fn asset_grid(backend: &Arc<FakeBackend>) -> (GridBinding<Asset>, Arc<AlertCenter>) {
    let alerts = Arc::new(AlertCenter::new(8));
    let mut options = GridOptions::new(Asset::NAME, Asset::SORT);
    options.debounce = DEBOUNCE;
    options.alerts = Arc::clone(&alerts);
    let grid = ResourceService::<Asset>::new(signed_in_client(backend))
        .grid(options)
        .expect("grid");
    (grid, alerts)
}

fn user_picker(backend: &Arc<FakeBackend>, debounce: Duration) -> RemotePicker<User> {
    RemotePicker::new(
        ResourceService::<User>::new(signed_in_client(backend)).fetch_fn(),
        10,
        debounce,
        User::NAME,
        None,
    )
    .expect("picker")
}

fn page_of(request: &labdesk::api::request::ApiRequest) -> Option<&str> {
    request.query_value("page")
}

#[test]
fn rapid_edits_send_one_request_with_the_final_query() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 30);
    let (mut grid, _) = asset_grid(&backend);

    grid.set_keyword("s");
    grid.set_keyword("sc");
    grid.set_filter("status", [FilterValue::from("AVAILABLE")]);
    grid.set_keyword("scope 1");
    assert!(grid.wait_settled(SETTLE));

    let calls = backend.list_calls(ASSETS);
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert_eq!(calls[0].query_value("keyword"), Some("scope 1"));
    assert_eq!(calls[0].query_value("status"), Some("AVAILABLE"));
    assert_eq!(grid.fetcher().stats().coalesced, 3);
}

#[test]
fn accepted_pages_never_exceed_the_page_size() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 23);
    let (mut grid, _) = asset_grid(&backend);
    grid.set_page_size(5).unwrap();
    assert!(grid.wait_settled(SETTLE));

    for page in 0..5 {
        grid.set_page(page);
        assert!(grid.wait_settled(SETTLE));
        let accepted = grid.page();
        assert!(accepted.content.len() <= 5);
        assert_eq!(accepted.number, page);
    }
    assert_eq!(grid.page().content.len(), 3);
    assert_eq!(grid.page_count(), 5);
}

#[test]
fn keyword_and_filter_changes_return_to_the_first_page() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 40);
    let (mut grid, _) = asset_grid(&backend);
    grid.load();
    assert!(grid.wait_settled(SETTLE));
    grid.set_page(2);
    assert!(grid.wait_settled(SETTLE));
    assert_eq!(page_of(backend.list_calls(ASSETS).last().unwrap()), Some("2"));

    grid.set_keyword("scope");
    assert!(grid.wait_settled(SETTLE));
    assert_eq!(page_of(backend.list_calls(ASSETS).last().unwrap()), Some("0"));

    grid.set_page(1);
    assert!(grid.wait_settled(SETTLE));
    grid.toggle_filter_value("status", FilterValue::from("BROKEN"));
    assert!(grid.wait_settled(SETTLE));
    let last = backend.list_calls(ASSETS).pop().unwrap();
    assert_eq!(page_of(&last), Some("0"));
    assert_eq!(last.query_value("status"), Some("BROKEN"));
    assert_eq!(grid.total_rows(), 8);
}

#[test]
fn unknown_sort_field_falls_back_to_the_default() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 3);
    let (mut grid, _) = asset_grid(&backend);
    grid.set_sort(Some(SortSpec::asc("warrantyExpiry")));
    assert!(grid.wait_settled(SETTLE));

    let call = backend.list_calls(ASSETS).pop().unwrap();
    let default = Asset::SORT.default_spec();
    assert_eq!(call.query_value("sortBy"), Some(default.field.as_str()));
    assert_eq!(call.query_value("sortOrder"), Some(default.direction.as_str()));
}

#[test]
fn second_page_of_twenty_five_rows_holds_rows_eleven_to_twenty() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 25);
    let (mut grid, _) = asset_grid(&backend);
    grid.set_sort(Some(SortSpec::asc("id")));
    assert!(grid.wait_settled(SETTLE));
    grid.set_page(1);
    assert!(grid.wait_settled(SETTLE));

    let rows = grid.rows();
    let ordinals: Vec<u64> = rows.iter().map(|r| r.ordinal).collect();
    let ids: Vec<i64> = rows.iter().map(|r| r.item.id).collect();
    assert_eq!(ordinals, (11..=20).collect::<Vec<u64>>());
    assert_eq!(ids, (11..=20).collect::<Vec<i64>>());
    assert_eq!(grid.total_rows(), 25);
    assert_eq!(grid.page_count(), 3);
}

#[test]
fn deleted_row_is_gone_from_the_refetched_page() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 12);
    let (mut grid, alerts) = asset_grid(&backend);
    grid.load();
    assert!(grid.wait_settled(SETTLE));
    let victim = grid.rows()[0].item.id;

    let service = ResourceService::<Asset>::new(signed_in_client(&backend));
    grid.mutate(MutationKind::Delete, || service.delete(victim))
        .expect("delete");
    assert!(grid.wait_settled(SETTLE));

    assert!(grid.rows().iter().all(|r| r.item.id != victim));
    assert_eq!(grid.total_rows(), 11);
    let alert = alerts.latest().expect("alert");
    assert_eq!(alert.level, AlertLevel::Success);
    assert_eq!(alert.message, "Asset deleted successfully");
}

#[test]
fn failed_mutation_keeps_the_page_and_raises_an_error() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 4);
    let (mut grid, alerts) = asset_grid(&backend);
    grid.load();
    assert!(grid.wait_settled(SETTLE));
    let before = backend.list_calls(ASSETS).len();

    let service = ResourceService::<Asset>::new(signed_in_client(&backend));
    let result = grid.mutate(MutationKind::Delete, || service.delete(999));
    assert!(result.is_err());
    assert!(grid.wait_settled(SETTLE));

    assert_eq!(backend.list_calls(ASSETS).len(), before);
    assert_eq!(grid.rows().len(), 4);
    let alert = alerts.latest().expect("alert");
    assert_eq!(alert.level, AlertLevel::Error);
    assert!(alert.message.starts_with("Failed to delete asset"), "{}", alert.message);
}

#[test]
fn created_and_duplicated_rows_show_up_after_refetch() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 2);
    let (mut grid, _) = asset_grid(&backend);
    grid.set_sort(Some(SortSpec::asc("id")));
    assert!(grid.wait_settled(SETTLE));

    let service = ResourceService::<Asset>::new(signed_in_client(&backend));
    let created = grid
        .mutate(MutationKind::Create, || {
            service.create(&serde_json::json!({"name": "Oscilloscope"}))
        })
        .unwrap()
        .expect("echoed entity");
    assert!(grid.wait_settled(SETTLE));
    let copy = grid
        .mutate(MutationKind::Duplicate, || service.duplicate(created.id))
        .unwrap()
        .expect("echoed copy");
    assert!(grid.wait_settled(SETTLE));

    let names: Vec<String> = grid.rows().into_iter().map(|r| r.item.name).collect();
    assert!(names.contains(&"Oscilloscope".to_string()));
    assert!(names.contains(&"Oscilloscope (copy)".to_string()));
    assert_eq!(grid.total_rows(), 4);
    assert_ne!(copy.id, created.id);
}

#[test]
fn slow_stale_response_never_overwrites_a_newer_one() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 9);
    backend.slow_for("scope 1", Duration::from_millis(400));
    let (grid, _) = asset_grid(&backend);
    let fetcher = grid.fetcher();

    let mut slow = QueryState::default();
    slow.set_keyword("scope 1");
    let mut fast = QueryState::default();
    fast.set_keyword("scope 2");
    fetcher.fetch_now(slow);
    std::thread::sleep(Duration::from_millis(50));
    fetcher.fetch_now(fast);
    assert!(fetcher.wait_settled(SETTLE));

    let page = fetcher.cached_page().expect("page");
    assert_eq!(page.content.len(), 1);
    assert_eq!(page.content[0].name, "Scope 2");
    assert_eq!(fetcher.stats().discarded, 1);
}

#[test]
fn unauthorized_list_shows_the_error_overlay() {
    let backend = FakeBackend::new().with_rows(ASSETS, "Scope", 3);
    let client = labdesk::api::client::ApiClient::new(
        Arc::clone(&backend) as Arc<dyn labdesk::api::transport::Transport>,
        Arc::new(labdesk::auth::tokens::TokenStore::in_memory()),
    );
    let grid = ResourceService::<Asset>::new(client)
        .grid(GridOptions::new(Asset::NAME, Asset::SORT))
        .unwrap();
    grid.load();
    assert!(grid.wait_settled(SETTLE));

    assert!(matches!(grid.overlay(), GridOverlay::Error(_)));
    assert!(grid.rows().is_empty());
    assert!(backend.requests()[0].context.bearer().is_none());
}

#[test]
fn typing_quickly_searches_once_for_the_final_keyword() {
    let backend = FakeBackend::new().with_rows(USERS, "Project", 3);
    let picker = user_picker(&backend, Duration::from_millis(300));
    picker.open();
    assert!(picker.wait_settled(SETTLE));
    backend.clear_requests();

    picker.search("proj");
    std::thread::sleep(Duration::from_millis(100));
    picker.search("project");
    assert!(picker.wait_settled(SETTLE));

    let calls = backend.list_calls(USERS);
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert_eq!(calls[0].query_value("keyword"), Some("project"));
    assert_eq!(picker.snapshot().keyword(), "project");
}

#[test]
fn load_more_never_duplicates_options_when_rows_shift() {
    let backend = FakeBackend::new().with_rows(USERS, "Member", 25);
    let picker = user_picker(&backend, Duration::from_millis(50));
    picker.open();
    assert!(picker.wait_settled(SETTLE));
    assert_eq!(picker.snapshot().len(), 10);

    // Newest first: a new user pushes row 16 onto the second page.
    backend.insert_front(
        USERS,
        Row {
            id: 26,
            name: "Member 26".to_string(),
            status: "USER".to_string(),
        },
    );
    assert!(picker.load_more());
    assert!(picker.wait_settled(SETTLE));
    while picker.load_more() {
        assert!(picker.wait_settled(SETTLE));
    }

    let state = picker.snapshot();
    let mut ids: Vec<i64> = state.items().iter().map(Identified::id).collect();
    let loaded = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), loaded);
    assert!(!state.has_more());
    assert!(picker.select(25));
    assert!(!picker.select(4242));
}

#[test]
fn clearing_the_input_restarts_an_unfiltered_search() {
    let backend = FakeBackend::new().with_rows(USERS, "Member", 4);
    let picker = user_picker(&backend, Duration::from_millis(50));
    picker.search("member 3");
    assert!(picker.wait_settled(SETTLE));
    assert_eq!(picker.snapshot().len(), 1);
    assert!(picker.select(3));

    picker.clear_input();
    assert!(picker.wait_settled(SETTLE));
    let state = picker.snapshot();
    assert_eq!(state.keyword(), "");
    assert_eq!(state.len(), 4);
    assert_eq!(state.selected(), None);
    assert_eq!(backend.ids(USERS).len(), 4);
}
