pub mod config;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod rag;
pub mod server;
