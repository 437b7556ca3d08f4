//! HTTP service for the digital wallet ledger.
//!
//! A thin axum layer over [`digital_wallet`]: request binding, the JSON
//! response envelopes, request correlation and process configuration.

pub mod api;
pub mod config;
pub mod logging;
