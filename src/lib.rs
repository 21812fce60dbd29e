//! Retrieval over a relational database: exact table summaries read straight
//! from the data source, plus semantic context from a vector index of sampled
//! rows that can be rebuilt while queries keep running.

pub mod config;
pub mod db;
pub mod error;
pub mod prompt;
pub mod rag;
pub mod service;
pub mod tables;
pub mod types;
