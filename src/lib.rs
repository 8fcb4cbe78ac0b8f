pub mod adapters;
pub mod config;
pub mod connection;
pub mod error;
pub mod fallback;
pub mod fusion;
pub mod observability;
pub mod service;
pub mod subscription;
pub mod types;
pub mod utils;
