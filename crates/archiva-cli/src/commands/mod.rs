pub mod common;
pub mod config;
pub mod delete;
pub mod lifecycle;
pub mod list;
pub mod listen;
pub mod sync;
