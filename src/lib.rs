pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod error;
pub mod html;
pub mod llm;
pub mod models;
pub mod neo4j_client;
pub mod pipeline;
pub mod rag;
pub mod retrieval;
pub mod scraper;
pub mod vector_store;
