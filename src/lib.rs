//! Token budgeting for LLM requests.
//!
//! - [`tokens`]: counting and truncation over a pluggable encoder
//! - [`windower`]: fitting a document into a budget
//! - [`chunker`]: overlapping, budget-sized chunks
//! - [`optimizer`]: assembling prompts under a budget
//! - [`batcher`]: folding near-duplicate requests
//! - [`conversation`]: stored conversation contexts and trimming
//! - [`cache`] and [`store`]: memoization over a key-value store

pub mod batcher;
pub mod cache;
pub mod chunker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod optimizer;
pub mod output;
pub mod segment;
pub mod similarity;
pub mod store;
pub mod tokens;
pub mod windower;

pub use error::{Result, TokenwrightError};
pub use tokens::{Outcome, TokenCounter};
