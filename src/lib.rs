//! # Leadwatch
//!
//! Scheduled search monitoring with language-model lead scoring.
//!
//! Leadwatch polls a public search feed on a cron schedule, stores every new
//! item, scores it for commercial relevance, and pushes leads that clear a
//! threshold to connected viewers in real time.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │ Scheduler │──▶│ Source client │──▶│  SQLite   │
//! │  (cron)   │   │   (search)    │   │   leads   │
//! └─────┬─────┘   └──────────────┘   └─────┬─────┘
//!       │         ┌──────────────┐         │
//!       └────────▶│ Scoring (LLM)│         │
//!                 └──────┬───────┘         │
//!                        ▼                 ▼
//!                 ┌──────────────┐   ┌──────────┐
//!                 │   Fan-out    │──▶│ HTTP/SSE │
//!                 └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! leadwatch init                 # create database
//! leadwatch search "mock interview" --partition jobs
//! leadwatch run                  # one monitoring cycle
//! leadwatch serve                # API + scheduler
//! leadwatch leads --min-score 70
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`schedule`] | Cron expressions |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite lead store |
//! | [`source`] | Search provider client |
//! | [`scoring`] | Scoring provider client |
//! | [`fanout`] | Qualifying-lead event fan-out |
//! | [`scheduler`] | Monitoring cycles |
//! | [`server`] | HTTP API and SSE |
//! | [`runtime`] | Process wiring |

pub mod config;
pub mod db;
pub mod fanout;
pub mod leads_cmd;
pub mod migrate;
pub mod runtime;
pub mod schedule;
pub mod scheduler;
pub mod scoring;
pub mod search_cmd;
pub mod server;
pub mod source;
pub mod sqlite_store;
pub mod stats;
