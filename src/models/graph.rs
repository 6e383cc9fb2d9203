//! Node/edge view of the whole wardrobe, ready for a graph renderer.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct GraphNode {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
}

/// An undirected edge; each matched pair appears exactly once.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub source: Uuid,
    pub target: Uuid,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}
