//! Fleet controller library.
//!
//! This crate primarily ships a `fleet-controller` binary, but we expose a
//! small library surface to enable integration testing and reuse.

pub mod api;
pub mod config;
pub mod controller;
pub mod state;
pub mod transport;
