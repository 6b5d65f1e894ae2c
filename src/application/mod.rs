//! Application services: catalog listings over the backing store.

pub mod catalog;
pub mod error;
pub mod repos;
