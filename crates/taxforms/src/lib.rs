//! Client intake for tax-preparation filings.
//!
//! The crate holds the record shapes captured from applicants (clients, tax forms, and the
//! per-form detail records), the field validators enforced on every write, and the persistence
//! contract a backing store has to honour. HTTP wiring lives in [`intake::router`]; the
//! `taxforms-api` service binary layers health, readiness, and metrics on top.

pub mod config;
pub mod error;
pub mod intake;
pub mod telemetry;
