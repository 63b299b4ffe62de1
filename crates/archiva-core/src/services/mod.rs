//! Shared services used across components.

mod store;

pub use store::StoreService;
