//! Bidirectional markup/HTML conversion service.
//!
//! `application` holds the request pipelines (timeout supervision, expansion
//! reuse, conversion and round-trip checks) behind the collaborator traits in
//! [`application::ports`]; `infra` wires them to HTTP, remote services and
//! telemetry.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
