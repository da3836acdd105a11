#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{Value, json};

use labdesk::api::client::ApiClient;
use labdesk::api::request::{ApiRequest, ApiResponse, Method};
use labdesk::api::transport::Transport;
use labdesk::auth::tokens::{SessionTokens, TokenStore};
use labdesk::core::errors::Result;

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// A row of any list: id, name, status. Serialized the way the backend does.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: i64,
    pub name: String,
    pub status: String,
}

impl Row {
    fn to_json(&self, collection: &str) -> Value {
        if collection == "/admin/users" {
            json!({"id": self.id, "firstName": self.name, "lastName": "", "email": format!("{}@lab.io", self.name.to_lowercase()), "role": self.status, "enabled": true})
        } else {
            json!({"id": self.id, "name": self.name, "status": self.status})
        }
    }
}

/// Pages, filters, sorts and mutates rows the way the real list endpoints do.
pub struct FakeBackend {
    collections: Mutex<HashMap<String, Vec<Row>>>,
    next_id: Mutex<i64>,
    requests: Mutex<Vec<ApiRequest>>,
    /// Extra latency for list calls with a given keyword.
    slow_keywords: Mutex<HashMap<String, Duration>>,
    require_auth: bool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            collections: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1000),
            requests: Mutex::new(Vec::new()),
            slow_keywords: Mutex::new(HashMap::new()),
            require_auth: true,
        })
    }

    /// `count` rows named `{prefix} 1..=count` with ids 1..=count.
    pub fn with_rows(self: Arc<Self>, path: &str, prefix: &str, count: i64) -> Arc<Self> {
        let rows = (1..=count)
            .map(|id| Row {
                id,
                name: format!("{prefix} {id}"),
                status: if id % 5 == 0 { "BROKEN" } else { "AVAILABLE" }.to_string(),
            })
            .collect();
        self.collections.lock().insert(path.to_string(), rows);
        self
    }

    pub fn insert_front(&self, path: &str, row: Row) {
        self.collections
            .lock()
            .entry(path.to_string())
            .or_default()
            .insert(0, row);
    }

    pub fn slow_for(&self, keyword: &str, delay: Duration) {
        self.slow_keywords.lock().insert(keyword.to_string(), delay);
    }

    pub fn ids(&self, path: &str) -> Vec<i64> {
        self.collections
            .lock()
            .get(path)
            .map(|rows| rows.iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// List calls against `path`, in arrival order.
    pub fn list_calls(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == Method::Get && r.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn list(&self, request: &ApiRequest) -> ApiResponse {
        let page: usize = request
            .query_value("page")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let size: usize = request
            .query_value("size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let keyword = request
            .query_value("keyword")
            .unwrap_or_default()
            .to_lowercase();
        let statuses: Vec<&str> = request
            .query
            .iter()
            .filter(|(k, _)| k == "status")
            .map(|(_, v)| v.as_str())
            .collect();

        if let Some(delay) = self.slow_keywords.lock().get(&keyword).copied() {
            thread::sleep(delay);
        }

        let mut rows: Vec<Row> = self
            .collections
            .lock()
            .get(&request.path)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| keyword.is_empty() || r.name.to_lowercase().contains(&keyword))
            .filter(|r| statuses.is_empty() || statuses.contains(&r.status.as_str()))
            .collect();
        match request.query_value("sortBy") {
            Some("name") => rows.sort_by(|a, b| a.name.cmp(&b.name)),
            _ => rows.sort_by_key(|r| r.id),
        }
        if request.query_value("sortOrder") == Some("desc") {
            rows.reverse();
        }

        let total = rows.len();
        let content: Vec<Value> = rows
            .iter()
            .skip(page * size)
            .take(size)
            .map(|r| r.to_json(&request.path))
            .collect();
        ApiResponse::json(
            200,
            &json!({"content": content, "totalElements": total, "number": page, "size": size}),
        )
    }

    fn mutate(&self, request: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        let (collection, id, action) = match segments.as_slice() {
            [a, b] => (format!("/{a}/{b}"), None, None),
            [a, b, id] => (format!("/{a}/{b}"), id.parse::<i64>().ok(), None),
            [a, b, id, action] => (format!("/{a}/{b}"), id.parse::<i64>().ok(), Some(*action)),
            _ => return not_found(),
        };
        let mut collections = self.collections.lock();
        let rows = collections.entry(collection.clone()).or_default();

        match (request.method, id, action) {
            (Method::Post, None, None) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                let Some(name) = body.get("name").and_then(Value::as_str) else {
                    return ApiResponse::json(400, &json!({"message": "name is required"}));
                };
                let row = Row {
                    id: self.take_id(),
                    name: name.to_string(),
                    status: body
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("AVAILABLE")
                        .to_string(),
                };
                let reply = row.to_json(&collection);
                rows.push(row);
                ApiResponse::json(201, &reply)
            }
            (Method::Post, Some(id), Some("duplicate")) => {
                let Some(source) = rows.iter().find(|r| r.id == id).cloned() else {
                    return not_found();
                };
                let copy = Row {
                    id: self.take_id(),
                    name: format!("{} (copy)", source.name),
                    status: source.status,
                };
                let reply = copy.to_json(&collection);
                rows.push(copy);
                ApiResponse::json(200, &reply)
            }
            (Method::Get, Some(id), None) => match rows.iter().find(|r| r.id == id) {
                Some(row) => ApiResponse::json(200, &row.to_json(&collection)),
                None => not_found(),
            },
            (Method::Put, Some(id), None) => {
                let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
                    return not_found();
                };
                if let Some(name) = request.body.as_ref().and_then(|b| b.get("name")).and_then(Value::as_str) {
                    row.name = name.to_string();
                }
                ApiResponse::json(200, &json!({"message": "updated"}))
            }
            (Method::Delete, Some(id), None) => {
                let before = rows.len();
                rows.retain(|r| r.id != id);
                if rows.len() == before {
                    not_found()
                } else {
                    ApiResponse::new(204, Vec::new())
                }
            }
            _ => not_found(),
        }
    }

    fn take_id(&self) -> i64 {
        let mut next = self.next_id.lock();
        *next += 1;
        *next
    }
}

fn not_found() -> ApiResponse {
    ApiResponse::json(404, &json!({"message": "Not found"}))
}

impl Transport for FakeBackend {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().push(request.clone());
        if self.require_auth && !request.context.is_authenticated() {
            return Ok(ApiResponse::json(401, &json!({"message": "Unauthorized"})));
        }
        let is_list = request.method == Method::Get
            && self.collections.lock().contains_key(&request.path);
        if is_list {
            Ok(self.list(request))
        } else {
            Ok(self.mutate(request))
        }
    }
}

/// Client signed in against `backend`.
pub fn signed_in_client(backend: &Arc<FakeBackend>) -> ApiClient {
    let tokens = TokenStore::in_memory();
    tokens
        .save(SessionTokens::new("test-access-token", Some("test-refresh")))
        .expect("save tokens");
    ApiClient::new(Arc::clone(backend) as Arc<dyn Transport>, Arc::new(tokens))
}

// ---------------------------------------------------------------------------
// Binary runner
// ---------------------------------------------------------------------------

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_labdesk") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "labdesk.exe" } else { "labdesk" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve labdesk binary path for integration test"),
    }
}

/// Config file under `dir` whose data paths all stay inside `dir`.
pub fn write_config(dir: &Path, base_url: &str) -> PathBuf {
    let path = dir.join("labdesk.toml");
    let body = format!(
        r#"[api]
base_url = "{base_url}"
timeout_ms = 2000

[grid]
debounce_ms = 50

[paths]
token_file = "{token}"
jsonl_log = "{jsonl}"
sqlite_db = "{sqlite}"

[ui]
locale = "en"
"#,
        token = dir.join("session.json").display(),
        jsonl = dir.join("activity.jsonl").display(),
        sqlite = dir.join("activity.sqlite3").display(),
    );
    fs::write(&path, body).expect("write test config");
    path
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("labdesk-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env_remove("LABDESK_OUTPUT_FORMAT")
        .env_remove("LABDESK_API_BASE_URL")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute labdesk command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
