//! Wardrobe catalog: clothing items with photos and a symmetric match graph,
//! served over HTTP.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
