//! src/services/object_store.rs
//!
//! Object storage for uploaded images. Metadata lives in SQLite, payloads on
//! local disk sharded beneath `base_path/{shard}/{shard}/{name}`.
//!
//! Writers go through an [`ObjectSession`]: a scoped handle that owns one
//! pooled SQLite connection for the duration of a single upload attempt and
//! gives it back when dropped. A failed attempt never hands its connection
//! state to the next one.

use crate::models::object::StoredObject;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::{SqlitePool, pool::PoolConnection, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object name")]
    InvalidName,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// The store refused the request up front; retrying cannot help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_) | StoreError::NotFound(_) | StoreError::InvalidName
        )
    }

    /// Whether the failed call may have left bytes under its name. A refusal
    /// never writes; `AlreadyExists` in particular means the name belongs to
    /// someone else.
    pub fn may_have_written(&self) -> bool {
        !self.is_terminal()
    }
}

/// Remote object storage as seen by the ingestion pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Acquire a session for one unit of work. The session is released when
    /// dropped.
    async fn session(&self) -> StoreResult<Box<dyn ObjectSession>>;

    /// Metadata for `name`, or [`StoreError::NotFound`].
    async fn stat(&self, name: &str) -> StoreResult<StoredObject>;

    /// Publicly fetchable URL for `name`. Pure; does not check existence.
    fn public_url(&self, name: &str) -> String;
}

/// A scoped handle onto the store.
#[async_trait]
pub trait ObjectSession: Send {
    /// Store `bytes` under `name`. Fails with [`StoreError::AlreadyExists`]
    /// rather than overwriting.
    async fn put(
        &mut self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> StoreResult<StoredObject>;

    /// Remove `name` and its payload.
    async fn delete(&mut self, name: &str) -> StoreResult<()>;
}

const MAX_OBJECT_NAME_LEN: usize = 255;

/// Disk-backed [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct DiskObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Prefix for public URLs, e.g. `http://localhost:3000`.
    pub public_base_url: String,
}

impl DiskObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Open a stored object for reading.
    ///
    /// Returns NotFound if the metadata row is missing or the payload has
    /// gone from disk.
    pub async fn open(&self, name: &str) -> StoreResult<(StoredObject, File)> {
        let object = self.stat(name).await?;

        let file = File::open(object_path(&self.base_path, name))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    StoreError::NotFound(name.to_string())
                } else {
                    StoreError::Io(err)
                }
            })?;

        Ok((object, file))
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn session(&self) -> StoreResult<Box<dyn ObjectSession>> {
        let conn = self.db.acquire().await?;
        Ok(Box::new(DiskSession {
            conn,
            base_path: self.base_path.clone(),
        }))
    }

    async fn stat(&self, name: &str) -> StoreResult<StoredObject> {
        ensure_name_safe(name)?;
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, name, content_type, size_bytes, etag, created_at
             FROM stored_objects WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::NotFound(name.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/images/{}", self.public_base_url.trim_end_matches('/'), name)
    }
}

/// One pooled connection plus the payload root. Dropping it returns the
/// connection to the pool.
struct DiskSession {
    conn: PoolConnection<Sqlite>,
    base_path: PathBuf,
}

#[async_trait]
impl ObjectSession for DiskSession {
    /// Write to a temp file, fsync, claim the name in SQLite, then rename
    /// into place. The name only becomes readable after the rename.
    async fn put(
        &mut self,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> StoreResult<StoredObject> {
        ensure_name_safe(name)?;

        let file_path = object_path(&self.base_path, name);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp = TempPath::new(parent.join(format!(".tmp-{}", Uuid::new_v4())));
        let mut file = File::create(tmp.path()).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let etag = format!("{:x}", md5::compute(&bytes));
        let object = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO stored_objects (id, name, content_type, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, name, content_type, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(content_type)
        .bind(bytes.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::AlreadyExists(name.to_string())
            } else {
                StoreError::Sqlx(err)
            }
        })?;

        if let Err(err) = fs::rename(tmp.path(), &file_path).await {
            let _ = sqlx::query("DELETE FROM stored_objects WHERE id = ?")
                .bind(object.id)
                .execute(&mut *self.conn)
                .await;
            return Err(StoreError::Io(err));
        }
        tmp.disarm();

        debug!(name, size = object.size_bytes, "stored object");
        Ok(object)
    }

    async fn delete(&mut self, name: &str) -> StoreResult<()> {
        ensure_name_safe(name)?;
        let result = sqlx::query("DELETE FROM stored_objects WHERE name = ?")
            .bind(name)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let file_path = object_path(&self.base_path, name);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(())
    }
}

/// Temp file removed on drop unless disarmed.
struct TempPath {
    path: PathBuf,
    armed: bool,
}

impl TempPath {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Reject names that could escape the shard directory.
fn ensure_name_safe(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
        return Err(StoreError::InvalidName);
    }
    if name.starts_with('.') || name.contains("..") || name.contains('/') {
        return Err(StoreError::InvalidName);
    }
    if name
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StoreError::InvalidName);
    }
    Ok(())
}

/// First two bytes of MD5(name) as lowercase hex.
fn object_shards(name: &str) -> (String, String) {
    let digest = md5::compute(name);
    (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
}

fn object_path(base_path: &Path, name: &str) -> PathBuf {
    let (shard_a, shard_b) = object_shards(name);
    let mut path = base_path.to_path_buf();
    path.push(shard_a);
    path.push(shard_b);
    path.push(name);
    path
}

/// Remove empty shard directories up to (not including) `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => {
                if let Some(parent) = current.parent() {
                    current = parent.to_path_buf();
                } else {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
