//! Zebra Server Library
//!
//! Multi-device time tracking backend. Devices work offline and reconcile
//! their projects and timer sessions through a single sync exchange.
//! The main server binary is in main.rs.
//!
//! # Modules
//!
//! - `sync`: Sync coordinator, conflict resolution, tombstones and cursors
//! - `db`: SQLite persistence for projects, sessions and device cursors
//! - `routes`: HTTP API
//! - `auth`: Bearer token verification

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;
