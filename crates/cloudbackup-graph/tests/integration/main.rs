//! Integration tests for cloudbackup-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and verifies
//! end-to-end behavior of the GraphClient, the remote listing provider,
//! folder creation, and uploads.

mod common;

mod test_drive_info;
mod test_folders;
mod test_listing;
mod test_upload;
