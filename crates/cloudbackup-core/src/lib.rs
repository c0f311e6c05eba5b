//! cloud-backup Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `HashedEntry`, `SyncDecision`, `SyncStatus`, `RemotePath`
//! - **Port definitions** - Traits for adapters: `IListingProvider`,
//!   `IRemoteListingProvider`, `IUploader`
//! - **Configuration** - YAML-backed settings shared by every adapter
//!
//! # Architecture
//!
//! The domain module contains pure value types with no I/O.
//! Ports define trait interfaces that adapter crates implement: the local
//! filesystem lister lives in `cloudbackup-sync`, the OneDrive listing and
//! upload adapters live in `cloudbackup-graph`.

pub mod config;
pub mod domain;
pub mod ports;
