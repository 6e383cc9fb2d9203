pub mod catalog;
pub mod compression;
pub mod ingest;
pub mod match_graph;
pub mod naming;
pub mod object_store;
pub mod retry;
