//! Archivarius bridge: drains finalized records from a live document
//! store into a public mirror and an encrypted secret archive, then
//! removes the originals upstream. See `SPEC_FULL.md` for the full
//! component design; modules here mirror it one-to-one.

pub mod blob_key;
pub mod config;
pub mod context;
pub mod controller;
pub mod couch_client;
pub mod crypto;
pub mod errors;
pub mod feeder;
pub mod filters;
pub mod models;
pub mod pool;
pub mod public_archive;
pub mod queues;
pub mod secret_store;
pub mod source_store;
pub mod stats;
pub mod upstream;
pub mod worker;
