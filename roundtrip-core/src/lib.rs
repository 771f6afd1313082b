//! Roundtrip core library: fixture, store clients, ingestion, harness and report.
//!
//! The main entry point is [`harness::Harness`], which runs the ordered
//! verification cases against a [`store::StoreClient`] session and produces a
//! [`harness::RunOutcome`] that [`report`] renders to disk.

pub mod config;
pub mod consistency;
pub mod embed;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod ingest;
pub mod progress;
pub mod query;
pub mod report;
pub mod store;
pub mod types;
