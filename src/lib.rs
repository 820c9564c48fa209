pub mod app;
pub mod cache;
pub mod config;
pub mod crucible;
pub mod domain;
pub mod error;
pub mod lineage;
pub mod output;
pub mod store;
pub mod tools;
pub mod visualize;
