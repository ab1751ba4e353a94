//! Request orchestration: normalization, conversion pipelines, timeouts and
//! round-trip checks.

pub mod adapter;
pub mod context;
pub mod convert;
pub mod error;
pub mod expansion;
pub mod ports;
pub mod render;
pub mod roundtrip;
pub mod sites;
pub mod timeout;
