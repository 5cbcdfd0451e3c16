use crate::error::{ReportError, Result};
use crate::model::ReportDraft;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INIT_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS report_draft_fields (
  field TEXT PRIMARY KEY,
  json TEXT NOT NULL,
  updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);
";

/// Field keys persisted independently. One corrupt field must never take
/// the rest of the draft down with it.
const FIELDS: &[&str] = &[
    "id",
    "client_id",
    "date_range",
    "metrics",
    "narratives",
    "summary_text",
    "signature",
    "theme",
    "media",
    "delivery",
    "status",
    "chart_png",
    "uploaded_url",
    "upload_digest",
    "last_saved_at",
];

/// Durable storage for the in-progress report. Injected into the workflow
/// controller; `init` runs at session start and `flush` at teardown.
#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn init(&self) -> Result<()>;
    /// Idempotent, last-write-wins per field.
    async fn save(&self, draft: &ReportDraft) -> Result<()>;
    /// `None` when the store has never seen a draft. Fields that fail to
    /// parse fall back to their defaults instead of failing the load.
    async fn load(&self) -> Result<Option<ReportDraft>>;
    async fn clear(&self) -> Result<()>;
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn draft_to_fields(draft: &ReportDraft) -> Result<Vec<(&'static str, String)>> {
    let value = serde_json::to_value(draft)?;
    let map = match value {
        Value::Object(map) => map,
        _ => return Err(ReportError::storage("draft did not serialize to an object")),
    };
    let mut out = Vec::with_capacity(FIELDS.len());
    for field in FIELDS {
        let field_value = map.get(*field).cloned().unwrap_or(Value::Null);
        out.push((*field, serde_json::to_string(&field_value)?));
    }
    Ok(out)
}

/// Reassembles a draft from whatever fields parsed. Each field is validated
/// in isolation against a default draft, so one corrupt field falls back to
/// its default without invalidating the rest.
fn draft_from_fields(rows: &BTreeMap<String, String>) -> Result<Option<ReportDraft>> {
    if rows.is_empty() {
        return Ok(None);
    }
    let defaults = match serde_json::to_value(ReportDraft::new())? {
        Value::Object(map) => map,
        _ => return Err(ReportError::storage("draft did not serialize to an object")),
    };
    let mut object = serde_json::Map::new();
    for field in FIELDS {
        let fallback = defaults.get(*field).cloned().unwrap_or(Value::Null);
        let value = match rows
            .get(*field)
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        {
            Some(candidate) => {
                let mut probe = defaults.clone();
                probe.insert((*field).to_string(), candidate.clone());
                if serde_json::from_value::<ReportDraft>(Value::Object(probe)).is_ok() {
                    candidate
                } else {
                    fallback
                }
            }
            None => fallback,
        };
        object.insert((*field).to_string(), value);
    }
    match serde_json::from_value::<ReportDraft>(Value::Object(object)) {
        Ok(draft) => Ok(Some(draft)),
        // Unrecoverable store: treat as empty rather than wedging the
        // session on startup.
        Err(_) => Ok(None),
    }
}

/// Sqlite-backed store. All access goes through `spawn_blocking` so the
/// event loop never waits on the filesystem.
pub struct SqliteDraftStore {
    path: PathBuf,
}

impl SqliteDraftStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(path: &Path) -> Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| ReportError::storage(format!("failed to open draft store: {e}")))?;
        conn.execute_batch(INIT_SQL)
            .map_err(|e| ReportError::storage(format!("failed to init draft store: {e}")))?;
        Ok(conn)
    }
}

#[async_trait]
impl DraftRepository for SqliteDraftStore {
    async fn init(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::open(&path).map(|_| ()))
            .await
            .map_err(|e| ReportError::storage(format!("task join error: {e}")))?
    }

    async fn save(&self, draft: &ReportDraft) -> Result<()> {
        let fields = draft_to_fields(draft)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::open(&path)?;
            let tx = conn
                .transaction()
                .map_err(|e| ReportError::storage(format!("failed to begin save: {e}")))?;
            for (field, json) in &fields {
                tx.execute(
                    "INSERT INTO report_draft_fields (field, json) VALUES (?1, ?2)
                     ON CONFLICT(field) DO UPDATE SET json = excluded.json,
                       updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now')",
                    rusqlite::params![field, json],
                )
                .map_err(|e| ReportError::storage(format!("failed to save {field}: {e}")))?;
            }
            tx.commit()
                .map_err(|e| ReportError::storage(format!("failed to commit save: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| ReportError::storage(format!("task join error: {e}")))?
    }

    async fn load(&self) -> Result<Option<ReportDraft>> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || -> Result<BTreeMap<String, String>> {
            if !path.exists() {
                return Ok(BTreeMap::new());
            }
            let conn = Self::open(&path)?;
            let mut stmt = conn
                .prepare("SELECT field, json FROM report_draft_fields")
                .map_err(|e| ReportError::storage(format!("failed to prepare load: {e}")))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| ReportError::storage(format!("failed to query draft: {e}")))?
                .collect::<std::result::Result<Vec<(String, String)>, rusqlite::Error>>()
                .map_err(|e| ReportError::storage(format!("failed to read draft: {e}")))?;
            Ok(rows.into_iter().collect())
        })
        .await
        .map_err(|e| ReportError::storage(format!("task join error: {e}")))??;

        draft_from_fields(&rows)
    }

    async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(());
            }
            let conn = Self::open(&path)?;
            conn.execute("DELETE FROM report_draft_fields", [])
                .map_err(|e| ReportError::storage(format!("failed to clear draft: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| ReportError::storage(format!("task join error: {e}")))?
    }
}

/// In-memory store for tests and ephemeral sessions. `insert_raw` writes an
/// arbitrary payload under a field key, which is how tests model partial
/// corruption of the persisted store.
#[derive(Default)]
pub struct MemoryDraftStore {
    fields: Mutex<BTreeMap<String, String>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, field: &str, json: impl Into<String>) {
        if let Ok(mut guard) = self.fields.lock() {
            guard.insert(field.to_string(), json.into());
        }
    }

    pub fn field(&self, field: &str) -> Option<String> {
        self.fields.lock().ok()?.get(field).cloned()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.fields
            .lock()
            .map_err(|_| ReportError::storage("draft store mutex poisoned"))
    }
}

#[async_trait]
impl DraftRepository for MemoryDraftStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn save(&self, draft: &ReportDraft) -> Result<()> {
        let fields = draft_to_fields(draft)?;
        let mut guard = self.locked()?;
        for (field, json) in fields {
            guard.insert(field.to_string(), json);
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<ReportDraft>> {
        let rows = self.locked()?.clone();
        draft_from_fields(&rows)
    }

    async fn clear(&self) -> Result<()> {
        self.locked()?.clear();
        Ok(())
    }
}
