//! keyprop control plane library.
//!
//! This crate primarily ships a `control-plane` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod audit;
pub mod config;
pub mod registry;
pub mod service;
pub mod state;
pub mod transport;
