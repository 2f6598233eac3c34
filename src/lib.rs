pub mod analysis;
pub mod answers;
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod llm;
pub mod store;
pub mod timer;
