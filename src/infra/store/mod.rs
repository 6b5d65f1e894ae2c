//! Catalog store adapters.
//!
//! Both implement [`CatalogRepo`](crate::application::repos::CatalogRepo): a
//! JSON directory for deployments and an in-memory map for tests and seeding.

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;
