//! src/services/match_graph.rs
//!
//! MatchGraphStore: the symmetric "goes with" relation between items.
//!
//! Each matched pair is one row, stored with the smaller id in `item_id`.
//! Reads union both columns, so a match is visible from either endpoint no
//! matter which id the caller passed first.

use crate::models::{
    graph::{GraphEdge, GraphNode, GraphSnapshot},
    matches::{ItemMatch, MatchingItem},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("an item cannot match itself")]
    SelfMatch,
    #[error("item `{0}` not found")]
    UnknownItem(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MatchResult<T> = Result<T, MatchError>;

#[derive(Clone, Debug)]
pub struct MatchGraphStore {
    pub db: Arc<SqlitePool>,
}

impl MatchGraphStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Every item linked to `item_id`, ordered by name then id.
    pub async fn get_matching_items(&self, item_id: Uuid) -> MatchResult<Vec<MatchingItem>> {
        let items = sqlx::query_as::<_, MatchingItem>(
            "SELECT c.id, c.name, c.image_url, c.description
             FROM clothing_items c
             JOIN (
                 SELECT matches_with_id AS other FROM item_matches WHERE item_id = ?
                 UNION
                 SELECT item_id AS other FROM item_matches WHERE matches_with_id = ?
             ) m ON m.other = c.id
             ORDER BY c.name, c.id",
        )
        .bind(item_id)
        .bind(item_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(items)
    }

    /// Replace the whole match set of `item_id` in one transaction.
    ///
    /// Self references are dropped and duplicates collapsed. If any id is
    /// unknown nothing changes.
    pub async fn set_matches(&self, item_id: Uuid, match_ids: &[Uuid]) -> MatchResult<()> {
        let mut seen = HashSet::new();
        let targets: Vec<Uuid> = match_ids
            .iter()
            .copied()
            .filter(|id| *id != item_id)
            .filter(|id| seen.insert(*id))
            .collect();
        if targets.len() < match_ids.len() {
            debug!(
                %item_id,
                dropped = match_ids.len() - targets.len(),
                "dropped self or duplicate match ids"
            );
        }

        let mut tx = self.db.begin().await?;
        ensure_item_exists(&mut *tx, item_id).await?;
        for other in &targets {
            ensure_item_exists(&mut *tx, *other).await?;
        }

        let removed = sqlx::query("DELETE FROM item_matches WHERE item_id = ? OR matches_with_id = ?")
            .bind(item_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for other in &targets {
            insert_edge(&mut *tx, item_id, *other).await?;
        }

        tx.commit().await?;
        debug!(%item_id, removed, added = targets.len(), "replaced matches");
        Ok(())
    }

    /// Link two items. Idempotent: an existing edge is returned unchanged.
    pub async fn add_match(&self, item_id: Uuid, other_id: Uuid) -> MatchResult<ItemMatch> {
        if item_id == other_id {
            return Err(MatchError::SelfMatch);
        }

        let mut tx = self.db.begin().await?;
        ensure_item_exists(&mut *tx, item_id).await?;
        ensure_item_exists(&mut *tx, other_id).await?;
        let edge = insert_edge(&mut *tx, item_id, other_id).await?;
        tx.commit().await?;
        Ok(edge)
    }

    /// Unlink two items. Returns whether an edge existed.
    pub async fn remove_match(&self, item_id: Uuid, other_id: Uuid) -> MatchResult<bool> {
        let (a, b) = ItemMatch::canonical(item_id, other_id);
        let result = sqlx::query("DELETE FROM item_matches WHERE item_id = ? AND matches_with_id = ?")
            .bind(a)
            .bind(b)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All items as nodes and every matched pair once as an edge.
    pub async fn graph(&self) -> MatchResult<GraphSnapshot> {
        let nodes = sqlx::query_as::<_, GraphNode>(
            "SELECT id, name, image_url FROM clothing_items ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&*self.db)
        .await?;

        let edges = sqlx::query_as::<_, GraphEdge>(
            "SELECT item_id AS source, matches_with_id AS target
             FROM item_matches ORDER BY created_at, id",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(GraphSnapshot { nodes, edges })
    }
}

async fn ensure_item_exists(conn: &mut SqliteConnection, id: Uuid) -> MatchResult<()> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM clothing_items WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match found {
        Some(_) => Ok(()),
        None => Err(MatchError::UnknownItem(id)),
    }
}

async fn insert_edge(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> MatchResult<ItemMatch> {
    let (item_id, matches_with_id) = ItemMatch::canonical(a, b);
    let inserted = sqlx::query_as::<_, ItemMatch>(
        "INSERT INTO item_matches (id, created_at, item_id, matches_with_id)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (item_id, matches_with_id) DO NOTHING
         RETURNING id, created_at, item_id, matches_with_id",
    )
    .bind(Uuid::new_v4())
    .bind(Utc::now())
    .bind(item_id)
    .bind(matches_with_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(edge) = inserted {
        return Ok(edge);
    }

    let existing = sqlx::query_as::<_, ItemMatch>(
        "SELECT id, created_at, item_id, matches_with_id
         FROM item_matches WHERE item_id = ? AND matches_with_id = ?",
    )
    .bind(item_id)
    .bind(matches_with_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        models::item::ClothingItemInput,
        services::{
            catalog::CatalogService,
            object_store::{DiskObjectStore, ObjectSession, ObjectStore},
        },
    };
    use bytes::Bytes;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        images: DiskObjectStore,
        catalog: CatalogService,
        matches: MatchGraphStore,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("graph.db").display());
        let pool = Arc::new(db::connect(&url).await.unwrap());
        db::run_migrations(&pool).await.unwrap();
        let images =
            DiskObjectStore::new(pool.clone(), dir.path().join("images"), "http://img.test");
        Fixture {
            _dir: dir,
            catalog: CatalogService::new(pool.clone(), Arc::new(images.clone())),
            images,
            matches: MatchGraphStore::new(pool),
        }
    }

    impl Fixture {
        async fn item(&self, name: &str) -> Uuid {
            let path = format!("{name}.jpg");
            let mut session = self.images.session().await.unwrap();
            session
                .put(&path, Bytes::from_static(b"jpeg"), "image/jpeg")
                .await
                .unwrap();
            drop(session);

            self.catalog
                .add_item(ClothingItemInput {
                    name: name.into(),
                    description: None,
                    image_url: self.images.public_url(&path),
                    image_path: path,
                })
                .await
                .unwrap()
                .id
        }

        async fn ids(&self, item: Uuid) -> Vec<Uuid> {
            let mut ids: Vec<Uuid> = self
                .matches
                .get_matching_items(item)
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.id)
                .collect();
            ids.sort();
            ids
        }
    }

    fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn set_matches_is_visible_from_both_ends() {
        let f = fixture().await;
        let (a, b, c) = (f.item("a").await, f.item("b").await, f.item("c").await);

        f.matches.set_matches(a, &[b, c]).await.unwrap();

        assert_eq!(f.ids(a).await, sorted(vec![b, c]));
        assert_eq!(f.ids(b).await, vec![a]);
        assert_eq!(f.ids(c).await, vec![a]);
    }

    #[tokio::test]
    async fn set_matches_replaces_instead_of_merging() {
        let f = fixture().await;
        let (a, b, c) = (f.item("a").await, f.item("b").await, f.item("c").await);

        f.matches.set_matches(a, &[b]).await.unwrap();
        f.matches.set_matches(a, &[c]).await.unwrap();
        assert_eq!(f.ids(a).await, vec![c]);
        assert!(f.ids(b).await.is_empty());

        f.matches.set_matches(a, &[]).await.unwrap();
        assert!(f.ids(a).await.is_empty());
        assert!(f.ids(c).await.is_empty());
    }

    #[tokio::test]
    async fn set_matches_removes_edges_stored_from_the_other_side() {
        let f = fixture().await;
        let (a, b) = (f.item("a").await, f.item("b").await);

        f.matches.add_match(b, a).await.unwrap();
        f.matches.set_matches(a, &[]).await.unwrap();

        assert!(f.ids(b).await.is_empty());
    }

    #[tokio::test]
    async fn self_and_duplicate_ids_are_dropped() {
        let f = fixture().await;
        let (a, b) = (f.item("a").await, f.item("b").await);

        f.matches.set_matches(a, &[a, b, b, a]).await.unwrap();

        assert_eq!(f.ids(a).await, vec![b]);
        assert_eq!(f.matches.graph().await.unwrap().edges.len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_leaves_previous_set_intact() {
        let f = fixture().await;
        let (a, b) = (f.item("a").await, f.item("b").await);
        f.matches.set_matches(a, &[b]).await.unwrap();

        let ghost = Uuid::new_v4();
        let err = f.matches.set_matches(a, &[ghost]).await.unwrap_err();

        assert!(matches!(err, MatchError::UnknownItem(id) if id == ghost));
        assert_eq!(f.ids(a).await, vec![b]);
    }

    #[tokio::test]
    async fn add_and_remove_are_direction_agnostic() {
        let f = fixture().await;
        let (a, b) = (f.item("a").await, f.item("b").await);

        let first = f.matches.add_match(a, b).await.unwrap();
        let again = f.matches.add_match(b, a).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(f.ids(b).await, vec![a]);

        assert!(f.matches.remove_match(b, a).await.unwrap());
        assert!(!f.matches.remove_match(a, b).await.unwrap());
        assert!(f.ids(a).await.is_empty());
    }

    #[tokio::test]
    async fn self_match_is_rejected() {
        let f = fixture().await;
        let a = f.item("a").await;
        assert!(matches!(
            f.matches.add_match(a, a).await,
            Err(MatchError::SelfMatch)
        ));
    }

    #[tokio::test]
    async fn deleting_an_item_drops_its_edges() {
        let f = fixture().await;
        let (a, b, c) = (f.item("a").await, f.item("b").await, f.item("c").await);
        f.matches.set_matches(a, &[b, c]).await.unwrap();

        f.catalog.delete_item(b).await.unwrap();

        assert_eq!(f.ids(a).await, vec![c]);
        let graph = f.matches.graph().await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
    }

    #[tokio::test]
    async fn graph_lists_each_pair_once() {
        let f = fixture().await;
        let (a, b, c) = (f.item("a").await, f.item("b").await, f.item("c").await);
        f.matches.set_matches(a, &[b, c]).await.unwrap();
        f.matches.add_match(c, b).await.unwrap();

        let graph = f.matches.graph().await.unwrap();

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        for edge in &graph.edges {
            assert!(edge.source < edge.target);
        }
    }
}
