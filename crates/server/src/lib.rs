//! Vigil server: report ingest, durable queueing and triangulation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  vigil-server                                 │
//! │                                               │
//! │  POST /v1/reports                             │
//! │        │                                      │
//! │  ┌─────▼──────┐      ┌──────────────────┐     │
//! │  │   Ingest   │─────▶│ Storage (SQLite) │     │
//! │  │ (validate, │      │ reports +        │     │
//! │  │  hex cell) │      │ submitters       │     │
//! │  └─────┬──────┘      └────────▲─────────┘     │
//! │        │ publish              │ neighbors,    │
//! │  ┌─────▼──────────┐           │ promote       │
//! │  │ Event bus      │    ┌──────┴─────────┐     │
//! │  │ (JetStream,    │───▶│ Worker pool    │     │
//! │  │  work queue)   │    │ (triangulation)│     │
//! │  └────────────────┘    └────────────────┘     │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Separation of concerns
//!
//! - **ingest**: synchronous validation and persistence; queue dispatch is
//!   detached and non-fatal
//! - **bus**: durable at-least-once work queue with explicit acks
//! - **worker**: consumer pool mapping handler outcomes to acks
//! - **triangulation**: the scoring run over the store (policy math lives in
//!   `vigil-engine`)
//! - **storage**: SQLite repositories for reports and submitters
//! - **api**: thin axum boundary

#![warn(missing_docs)]

pub mod api;
pub mod bus;
pub mod config;
pub mod ingest;
pub mod storage;
pub mod triangulation;
pub mod worker;
