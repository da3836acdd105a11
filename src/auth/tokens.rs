//! Persisted session tokens with a read-through accessor.
//!
//! Callers never hold on to a token: each request asks [`TokenStore`] for the
//! current access token while it is being built. The revision counter lets
//! observers notice login/logout without polling the file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{LabError, Result};

/// Access/refresh pair as stored on disk (`accessToken`, `refreshToken`).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: Option<&str>) -> Self {
        Self {
            access_token: Some(access.into()),
            refresh_token: refresh.map(str::to_string),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &self.access_token.as_deref().map(fingerprint))
            .field("refresh_token", &self.refresh_token.as_deref().map(fingerprint))
            .finish()
    }
}

/// On-disk shape, including the older single `jwt` key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    jwt: Option<String>,
}

impl From<StoredSession> for SessionTokens {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: stored.access_token.or(stored.jwt),
            refresh_token: stored.refresh_token,
        }
    }
}

/// Thread-safe token holder, optionally backed by a JSON file.
pub struct TokenStore {
    path: Option<PathBuf>,
    current: RwLock<SessionTokens>,
    revision: AtomicU64,
}

impl TokenStore {
    /// Store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(SessionTokens::default()),
            revision: AtomicU64::new(0),
        }
    }

    /// Open the store at `path`, loading any saved session.
    ///
    /// A missing file means "logged out". An unreadable or corrupt file is an error.
    pub fn open(path: &Path) -> Result<Self> {
        let tokens = match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => SessionTokens::default(),
            Ok(raw) => serde_json::from_str::<StoredSession>(&raw)
                .map_err(|error| LabError::Serialization {
                    context: "token store",
                    details: format!("{}: {error}", path.display()),
                })?
                .into(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => SessionTokens::default(),
            Err(error) => return Err(LabError::io(path, error)),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(tokens),
            revision: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionTokens {
        self.current.read().clone()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.current.read().access_token.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().access_token.is_some()
    }

    /// Incremented on every save/clear.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Persist then publish new tokens.
    pub fn save(&self, tokens: SessionTokens) -> Result<()> {
        if let Some(path) = &self.path {
            write_atomic(path, &tokens)?;
        }
        *self.current.write() = tokens;
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Forget the session. Memory is cleared before the file so a failed
    /// delete never leaves this process authenticated.
    pub fn clear(&self) -> Result<()> {
        *self.current.write() = SessionTokens::default();
        self.revision.fetch_add(1, Ordering::AcqRel);
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(LabError::io(path, error)),
            }
        }
        Ok(())
    }
}

/// Short SHA-256 prefix of a token, safe to log.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

fn write_atomic(path: &Path, tokens: &SessionTokens) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| LabError::io(parent, source))?;
    }
    let tmp_path = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(tokens)?;
    write_private(&tmp_path, &data).map_err(|source| LabError::io(&tmp_path, source))?;
    fs::rename(&tmp_path, path).map_err(|source| LabError::io(path, source))?;
    Ok(())
}

/// Owner-only file: the session holds bearer credentials.
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    // A leftover temp file would keep its old mode.
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
