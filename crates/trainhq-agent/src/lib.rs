//! On-device side of HQ remote training: submits recorded datasets, tracks
//! the resulting jobs and fetches their artifacts.

pub mod agent;
pub mod api;
pub mod archive;
pub mod artifacts;
pub mod config;
pub mod device;
pub mod error;
pub mod hq_client;
pub mod logging;
pub mod status_sync;
pub mod store;
pub mod submission;
pub mod ticker;

#[cfg(test)]
mod testing;
