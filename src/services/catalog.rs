//! src/services/catalog.rs
//!
//! CatalogService: clothing item records in SQLite. Listing is newest first
//! with opaque continuation cursors; search is a case-insensitive substring
//! match on name and description.

use crate::{
    models::item::{
        ClothingItem, ClothingItemInput, ClothingItemPatch, MAX_DESCRIPTION_LEN, MAX_NAME_LEN,
    },
    services::object_store::{ObjectStore, StoreError},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const ITEM_COLUMNS: &str = "id, created_at, updated_at, name, description, image_path, image_url";
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("item `{0}` not found")]
    NotFound(Uuid),
    #[error("invalid item: {0}")]
    Invalid(String),
    #[error("invalid cursor")]
    InvalidCursor,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Clone, Debug, Default)]
pub struct ListItemsParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug)]
pub struct ItemPage {
    pub items: Vec<ClothingItem>,
    pub next_cursor: Option<String>,
}

/// Result of [`CatalogService::update_item`].
#[derive(Debug)]
pub struct ItemUpdate {
    pub item: ClothingItem,
    /// Image the item pointed at before, when the patch swapped it out.
    pub replaced_image: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    pub db: Arc<SqlitePool>,
    /// Resolves image paths to stored objects and their public URLs.
    images: Arc<dyn ObjectStore>,
}

impl CatalogService {
    pub fn new(db: Arc<SqlitePool>, images: Arc<dyn ObjectStore>) -> Self {
        Self { db, images }
    }

    /// Items newest first. `next_cursor` is set when more items remain.
    pub async fn list_items(&self, params: ListItemsParams) -> CatalogResult<ItemPage> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let fetch_limit = limit + 1;

        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {ITEM_COLUMNS} FROM clothing_items"));

        if let Some(token) = params.cursor.as_deref() {
            let (created_at, id) = decode_cursor(token)?;
            builder.push(" WHERE created_at < ");
            builder.push_bind(created_at);
            builder.push(" OR (created_at = ");
            builder.push_bind(created_at);
            builder.push(" AND id < ");
            builder.push_bind(id);
            builder.push(")");
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut items: Vec<ClothingItem> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_cursor = None;
        if items.len() == fetch_limit {
            items.pop();
            next_cursor = items
                .last()
                .map(|last| encode_cursor(last.created_at, last.id));
        }

        Ok(ItemPage { items, next_cursor })
    }

    /// Items whose name or description contains `term`, newest first.
    pub async fn search_items(&self, term: &str) -> CatalogResult<Vec<ClothingItem>> {
        let pattern = format!("%{}%", escape_like(term.trim()));
        let items = sqlx::query_as::<_, ClothingItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM clothing_items
             WHERE name LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\'
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&*self.db)
        .await?;
        Ok(items)
    }

    pub async fn get_item(&self, id: Uuid) -> CatalogResult<ClothingItem> {
        sqlx::query_as::<_, ClothingItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM clothing_items WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::NotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }

    pub async fn add_item(&self, input: ClothingItemInput) -> CatalogResult<ClothingItem> {
        let name = normalize_name(&input.name)?;
        let description = normalize_description(input.description.as_deref())?;
        let image_url = self.resolve_image(&input.image_path).await?;
        if image_url != input.image_url {
            return Err(CatalogError::Invalid(
                "image_url does not match image_path".into(),
            ));
        }

        let now = Utc::now();
        let item = sqlx::query_as::<_, ClothingItem>(&format!(
            "INSERT INTO clothing_items ({ITEM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(&name)
        .bind(&description)
        .bind(&input.image_path)
        .bind(&image_url)
        .fetch_one(&*self.db)
        .await
        .map_err(image_in_use)?;

        debug!(id = %item.id, name = %item.name, "added item");
        Ok(item)
    }

    /// Apply `patch` and bump `updated_at`.
    ///
    /// A new `image_path` must name a stored object not used by any other
    /// item; the URL is derived from it.
    pub async fn update_item(
        &self,
        id: Uuid,
        patch: ClothingItemPatch,
    ) -> CatalogResult<ItemUpdate> {
        let current = self.get_item(id).await?;

        let name = match patch.name.as_deref() {
            Some(name) => normalize_name(name)?,
            None => current.name.clone(),
        };
        let description = match patch.description.as_deref() {
            Some(description) => normalize_description(Some(description))?,
            None => current.description.clone(),
        };
        let (image_path, image_url) = match patch.image_path {
            Some(path) if path != current.image_path => {
                let url = self.resolve_image(&path).await?;
                (path, url)
            }
            _ => (current.image_path.clone(), current.image_url.clone()),
        };
        let replaced_image =
            (image_path != current.image_path).then(|| current.image_path.clone());
        let updated_at = Utc::now().max(current.created_at);

        let item = sqlx::query_as::<_, ClothingItem>(&format!(
            "UPDATE clothing_items
             SET name = ?, description = ?, image_path = ?, image_url = ?, updated_at = ?
             WHERE id = ?
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&name)
        .bind(&description)
        .bind(&image_path)
        .bind(&image_url)
        .bind(updated_at)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::NotFound(id),
            other => image_in_use(other),
        })?;

        Ok(ItemUpdate {
            item,
            replaced_image,
        })
    }

    /// Delete an item and return the removed record. Match edges touching it
    /// go with it through the foreign-key cascade.
    pub async fn delete_item(&self, id: Uuid) -> CatalogResult<ClothingItem> {
        sqlx::query_as::<_, ClothingItem>(&format!(
            "DELETE FROM clothing_items WHERE id = ? RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => CatalogError::NotFound(id),
            other => CatalogError::Sqlx(other),
        })
    }

    /// Public URL of the stored image `path`. Fails if nothing is stored there.
    async fn resolve_image(&self, path: &str) -> CatalogResult<String> {
        match self.images.stat(path).await {
            Ok(object) => Ok(self.images.public_url(&object.name)),
            Err(StoreError::NotFound(_) | StoreError::InvalidName) => Err(
                CatalogError::Invalid(format!("image `{path}` is not stored")),
            ),
            Err(err) => Err(err.into()),
        }
    }
}

fn normalize_name(raw: &str) -> CatalogResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CatalogError::Invalid("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CatalogError::Invalid(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn normalize_description(raw: Option<&str>) -> CatalogResult<Option<String>> {
    let Some(description) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(CatalogError::Invalid(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(Some(description.to_string()))
}

/// Map the unique index on `image_path` to a validation error.
fn image_in_use(err: sqlx::Error) -> CatalogError {
    let unique = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    );
    if unique {
        CatalogError::Invalid("image is already used by another item".into())
    } else {
        CatalogError::Sqlx(err)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    let raw = format!(
        "{}|{}",
        created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        id
    );
    general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

fn decode_cursor(token: &str) -> CatalogResult<(DateTime<Utc>, Uuid)> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| CatalogError::InvalidCursor)?;
    let raw = String::from_utf8(bytes).map_err(|_| CatalogError::InvalidCursor)?;
    let (created_at, id) = raw.split_once('|').ok_or(CatalogError::InvalidCursor)?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|_| CatalogError::InvalidCursor)?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).map_err(|_| CatalogError::InvalidCursor)?;
    Ok((created_at, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        services::object_store::{DiskObjectStore, ObjectSession},
    };
    use bytes::Bytes;
    use tempfile::TempDir;

    struct Fixture {
        catalog: CatalogService,
        images: DiskObjectStore,
    }

    impl Fixture {
        /// Store a placeholder image under `path`.
        async fn store_image(&self, path: &str) {
            let mut session = self.images.session().await.unwrap();
            session
                .put(path, Bytes::from_static(b"jpeg"), "image/jpeg")
                .await
                .unwrap();
        }

        /// Input for `name` whose image is stored as `{name}.jpg`.
        async fn input(&self, name: &str, description: Option<&str>) -> ClothingItemInput {
            let path = format!("{name}.jpg");
            self.store_image(&path).await;
            ClothingItemInput {
                name: name.into(),
                description: description.map(Into::into),
                image_url: self.images.public_url(&path),
                image_path: path,
            }
        }
    }

    async fn service(dir: &TempDir) -> Fixture {
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let pool = Arc::new(db::connect(&url).await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        let images =
            DiskObjectStore::new(pool.clone(), dir.path().join("images"), "http://img.test");
        Fixture {
            catalog: CatalogService::new(pool, Arc::new(images.clone())),
            images,
        }
    }

    #[tokio::test]
    async fn add_trims_and_normalizes() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;

        let item = catalog
            .add_item(fx.input("  Linen Shirt  ", Some("   ")).await)
            .await
            .unwrap();

        assert_eq!(item.name, "Linen Shirt");
        assert_eq!(item.description, None);
        assert_eq!(item.created_at, item.updated_at);
        assert_eq!(catalog.get_item(item.id).await.unwrap(), item);
    }

    #[tokio::test]
    async fn add_rejects_bad_fields() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;

        let blank = catalog.add_item(fx.input("   ", None).await).await.unwrap_err();
        assert!(matches!(blank, CatalogError::Invalid(_)));

        let long_name = "x".repeat(MAX_NAME_LEN + 1);
        let err = catalog.add_item(fx.input(&long_name, None).await).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        let long_description = "y".repeat(MAX_DESCRIPTION_LEN + 1);
        let err = catalog
            .add_item(fx.input("Coat", Some(&long_description)).await)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        let exact = "z".repeat(MAX_NAME_LEN);
        assert!(catalog.add_item(fx.input(&exact, None).await).await.is_ok());
    }

    #[tokio::test]
    async fn add_rejects_url_that_does_not_follow_path() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;

        let mut input = fx.input("Scarf", None).await;
        input.image_url = "http://elsewhere/other.jpg".into();
        let err = fx.catalog.add_item(input).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));

        let unstored = ClothingItemInput {
            name: "Gloves".into(),
            description: None,
            image_path: "nope.jpg".into(),
            image_url: fx.images.public_url("nope.jpg"),
        };
        let err = fx.catalog.add_item(unstored).await.unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[tokio::test]
    async fn update_bumps_updated_at_and_keeps_image_pair() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;
        let item = catalog.add_item(fx.input("Boots", None).await).await.unwrap();

        let update = catalog
            .update_item(
                item.id,
                ClothingItemPatch {
                    description: Some("brown leather".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(update.replaced_image, None);
        let updated = update.item;
        assert_eq!(updated.name, "Boots");
        assert_eq!(updated.description.as_deref(), Some("brown leather"));
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(updated.created_at, item.created_at);

        let err = catalog
            .update_item(
                item.id,
                ClothingItemPatch {
                    image_path: Some("other.jpg".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
        assert_eq!(catalog.get_item(item.id).await.unwrap().image_path, "Boots.jpg");
    }

    #[tokio::test]
    async fn new_image_path_derives_url_and_reports_old_image() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let item = fx.catalog.add_item(fx.input("Boots", None).await).await.unwrap();
        fx.store_image("boots_v2.jpg").await;

        let update = fx
            .catalog
            .update_item(
                item.id,
                ClothingItemPatch {
                    image_path: Some("boots_v2.jpg".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(update.item.image_path, "boots_v2.jpg");
        assert_eq!(update.item.image_url, "http://img.test/images/boots_v2.jpg");
        assert_eq!(update.replaced_image.as_deref(), Some("Boots.jpg"));
    }

    #[tokio::test]
    async fn image_cannot_be_shared_between_items() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        fx.catalog.add_item(fx.input("Shirt", None).await).await.unwrap();
        let other = fx.catalog.add_item(fx.input("Jeans", None).await).await.unwrap();

        let err = fx
            .catalog
            .update_item(
                other.id,
                ClothingItemPatch {
                    image_path: Some("Shirt.jpg".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Invalid(_)));
        assert_eq!(
            fx.catalog.get_item(other.id).await.unwrap().image_path,
            "Jeans.jpg"
        );
    }

    #[tokio::test]
    async fn missing_items_are_not_found() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;
        let id = Uuid::new_v4();

        assert!(matches!(catalog.get_item(id).await, Err(CatalogError::NotFound(x)) if x == id));
        assert!(matches!(catalog.delete_item(id).await, Err(CatalogError::NotFound(_))));
        assert!(matches!(
            catalog.update_item(id, ClothingItemPatch::default()).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;
        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            ids.push(catalog.add_item(fx.input(name, None).await).await.unwrap().id);
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = catalog
                .list_items(ListItemsParams {
                    limit: Some(2),
                    cursor: cursor.clone(),
                })
                .await
                .unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(page.items.iter().map(|item| item.name.clone()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert_eq!(seen.first().map(String::as_str), Some("e"));
    }

    #[tokio::test]
    async fn garbage_cursor_is_rejected() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;
        let err = catalog
            .list_items(ListItemsParams {
                limit: None,
                cursor: Some("%%%".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCursor));
    }

    #[tokio::test]
    async fn search_matches_name_or_description() {
        let dir = TempDir::new().unwrap();
        let fx = service(&dir).await;
        let catalog = &fx.catalog;
        catalog.add_item(fx.input("Navy Blazer", None).await).await.unwrap();
        catalog
            .add_item(fx.input("Chinos", Some("navy, slim fit")).await)
            .await
            .unwrap();
        catalog.add_item(fx.input("White Tee", None).await).await.unwrap();
        catalog.add_item(fx.input("100% Wool", None).await).await.unwrap();

        let found = catalog.search_items("NAVY").await.unwrap();
        let mut names: Vec<_> = found.into_iter().map(|i| i.name).collect();
        names.sort();
        assert_eq!(names, vec!["Chinos", "Navy Blazer"]);

        let literal = catalog.search_items("0%").await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].name, "100% Wool");
    }
}
