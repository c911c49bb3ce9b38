//! # Leadwatch Core
//!
//! Shared, I/O-free logic for Leadwatch: the lead data model, the error
//! taxonomy, the [`store::LeadStore`] abstraction (with an in-memory
//! implementation), and the pure halves of the scoring client (prompt
//! construction and response normalization).
//!
//! This crate contains no tokio, sqlx, or network dependencies.

pub mod error;
pub mod models;
pub mod scoring;
pub mod store;

pub use error::{LeadError, Result};
