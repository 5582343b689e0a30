//! tally library crate
//!
//! A project/task tracker with a conversational assistant layer. Work is
//! organized as categories → projects → hierarchical tasks; completion
//! percentages aggregate bottom-up through the task tree, and a language
//! model can drive the same mutations through a constrained action batch.
//!
//! Module map:
//! - [`models`]: records and patch types
//! - [`store`]: the record-store boundary and the in-memory implementation
//! - [`tree`]: flat task list to ordered forest
//! - [`tracker`]: completion aggregation, cascades, subtree deletion
//! - [`actions`]: the AI action batch interpreter
//! - [`assistant`]: model boundary, reply coercion, conversations
//! - [`api`]: axum HTTP surface
//! - [`cli`]: clap command-line interface

pub mod actions;
pub mod api;
pub mod assistant;
pub mod cli;
pub mod models;
pub mod store;
pub mod tracker;
pub mod tree;

pub use store::{MemoryStore, Store};
pub use tracker::Tracker;
