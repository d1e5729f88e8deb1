//! `loadhub-scheduler` library target.
//!
//! Exposes the router and shared state for integration tests. The binary
//! `main.rs` depends on this library target.

pub mod auth;
pub mod dto;
pub mod error;
pub mod poll;
pub mod routes;
pub mod state;
