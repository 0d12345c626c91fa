//! Shared types used across the blog aggregator crates.

pub mod types;

pub use types::EntityId;
