pub mod application;
pub mod cache;
pub mod client;
pub mod config;
pub mod infra;
