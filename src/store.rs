use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{DrillError, Result};

/// Collection that attempt records are written to
pub const ATTEMPTS: &str = "attempts";

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub fields: serde_json::Value,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeListener = Box<dyn FnMut(&Document)>;

/// Generic document database the runner reads stimuli from and writes attempts to
pub trait DocumentStore {
    /// All documents of a collection, ordered by `order_by` field when given,
    /// insertion order otherwise.
    fn query(&self, collection: &str, order_by: Option<&str>) -> Result<Vec<Document>>;

    /// Store a new document and return its generated id
    fn create(&self, collection: &str, fields: serde_json::Value) -> Result<String>;

    /// Call `on_change` for every document created in `collection` from now on
    fn subscribe(&self, collection: &str, on_change: ChangeListener) -> SubscriptionId;

    /// Returns false if the subscription was already gone
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

struct Listener {
    id: SubscriptionId,
    collection: String,
    on_change: ChangeListener,
}

/// SQLite-backed document store. Each document's fields are a JSON column.
pub struct SqliteDocumentStore {
    conn: Connection,
    path: Option<PathBuf>,
    listeners: RefCell<Vec<Listener>>,
    next_subscription: Cell<u64>,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore")
            .field("path", &self.path)
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl SqliteDocumentStore {
    /// Open (or create) the database file, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                fields TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
            [],
        )?;

        tracing::debug!(path = ?path, "document store ready");

        Ok(Self {
            conn,
            path,
            listeners: RefCell::new(Vec::new()),
            next_subscription: Cell::new(1),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn notify(&self, doc: &Document) {
        // A listener that writes back into the store would re-enter here
        let Ok(mut listeners) = self.listeners.try_borrow_mut() else {
            tracing::warn!(collection = %doc.collection, "nested store write; listeners skipped");
            return;
        };
        for listener in listeners
            .iter_mut()
            .filter(|l| l.collection == doc.collection)
        {
            (listener.on_change)(doc);
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn query(&self, collection: &str, order_by: Option<&str>) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, collection, fields, created_at
            FROM documents
            WHERE collection = ?1
            ORDER BY json_extract(fields, ?2), rowid
            "#,
        )?;

        let path = order_by.map(|field| format!("$.{field}"));
        let rows = stmt.query_map(params![collection, path], |row| {
            let fields: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, fields, created_at))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, collection, fields, created_at) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| DrillError::InvalidConfig(format!("bad timestamp on {id}: {e}")))?
                .with_timezone(&Local);
            docs.push(Document {
                id,
                collection,
                fields: serde_json::from_str(&fields)?,
                created_at,
            });
        }

        Ok(docs)
    }

    fn create(&self, collection: &str, fields: serde_json::Value) -> Result<String> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            collection: collection.to_string(),
            fields,
            created_at: Local::now(),
        };

        self.conn.execute(
            "INSERT INTO documents (id, collection, fields, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                doc.id,
                doc.collection,
                serde_json::to_string(&doc.fields)?,
                doc.created_at.to_rfc3339(),
            ],
        )?;

        self.notify(&doc);
        Ok(doc.id)
    }

    fn subscribe(&self, collection: &str, on_change: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            collection: collection.to_string(),
            on_change,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }
}

/// Resolves stored image references to URLs a viewer can open
pub trait BlobStore {
    fn public_url(&self, path: &str) -> Result<String>;
}

fn is_absolute_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://") || path.starts_with("file://")
}

/// Blob store published under a base URL (a bucket or CDN prefix)
#[derive(Debug, Clone)]
pub struct UrlBlobStore {
    base: String,
}

impl UrlBlobStore {
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self { base: base.into() }
    }
}

impl BlobStore for UrlBlobStore {
    fn public_url(&self, path: &str) -> Result<String> {
        if is_absolute_url(path) {
            return Ok(path.to_string());
        }
        Ok(format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

/// Blob store backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl BlobStore for LocalBlobStore {
    fn public_url(&self, path: &str) -> Result<String> {
        if is_absolute_url(path) {
            return Ok(path.to_string());
        }
        let full = self.root.join(path.trim_start_matches('/'));
        if !full.exists() {
            return Err(DrillError::Blob(format!("{} not found", full.display())));
        }
        Ok(format!("file://{}", full.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::rc::Rc;
    use tempfile::tempdir;

    #[test]
    fn create_then_query_in_insertion_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.create("wat_words", json!({"id": "w2", "text": "brave"})).unwrap();
        store.create("wat_words", json!({"id": "w1", "text": "army"})).unwrap();
        store.create("srt_situations", json!({"id": "s1", "text": "x"})).unwrap();

        let docs = store.query("wat_words", None).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.fields["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["w2", "w1"]);
        assert_eq!(store.count("srt_situations").unwrap(), 1);
    }

    #[test]
    fn query_orders_by_field() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.create("c", json!({"rank": 3})).unwrap();
        store.create("c", json!({"rank": 1})).unwrap();
        store.create("c", json!({"rank": 2})).unwrap();

        let ranks: Vec<i64> = store
            .query("c", Some("rank"))
            .unwrap()
            .iter()
            .map(|d| d.fields["rank"].as_i64().unwrap())
            .collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn generated_ids_are_unique() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let a = store.create("c", json!({})).unwrap();
        let b = store.create("c", json!({})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn subscribers_see_creates_in_their_collection_only() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = store.subscribe(
            ATTEMPTS,
            Box::new(move |doc| sink.borrow_mut().push(doc.id.clone())),
        );

        let id = store.create(ATTEMPTS, json!({"score": 1})).unwrap();
        store.create("other", json!({})).unwrap();
        assert_eq!(*seen.borrow(), vec![id]);

        assert!(store.unsubscribe(sub));
        assert!(!store.unsubscribe(sub));
        store.create(ATTEMPTS, json!({})).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("parade.db");
        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.create("c", json!({"k": "v"})).unwrap();
        }
        let store = SqliteDocumentStore::open(&path).unwrap();
        let docs = store.query("c", None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["k"], "v");
    }

    #[test]
    fn url_blob_store_joins_paths() {
        let blobs = UrlBlobStore::new("https://cdn.example.org/tat/");
        assert_eq!(
            blobs.public_url("/pic-01.jpg").unwrap(),
            "https://cdn.example.org/tat/pic-01.jpg"
        );
        assert_eq!(
            blobs.public_url("https://elsewhere.org/a.png").unwrap(),
            "https://elsewhere.org/a.png"
        );
    }

    #[test]
    fn local_blob_store_requires_the_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("p.png"), b"png").unwrap();
        let blobs = LocalBlobStore::new(dir.path());

        assert!(blobs.public_url("p.png").unwrap().starts_with("file://"));
        assert_matches!(blobs.public_url("missing.png"), Err(DrillError::Blob(_)));
    }
}
