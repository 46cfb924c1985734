//! services/api/src/lib.rs
//!
//! The `api` service: adapters for the core ports, per-user storage and
//! indexing, session handling and the HTTP surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod library;
pub mod sessions;
pub mod storage;
pub mod web;
