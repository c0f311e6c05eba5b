//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the reconciler and the
//! backup runner depend on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IListingProvider`] - Flat, hashed listing of one folder
//! - [`IRemoteListingProvider`] - Listing plus idempotent folder creation
//! - [`IUploader`] - Transfers one local file into a remote folder
//! - [`Tokens`] - OAuth credentials shared by the remote adapters

pub mod credentials;
pub mod listing_provider;
pub mod uploader;

pub use credentials::Tokens;
pub use listing_provider::{IListingProvider, IRemoteListingProvider};
pub use uploader::{IUploader, UploadedItem};
