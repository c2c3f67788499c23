//! modsync - Mod download cache and package sync
//!
//! This library keeps a local mod folder in step with a remote mod catalog.
//! It issues conditional requests against cached ETags, verifies every
//! download against SHA-1 hashes from the mod manifest, extracts verified
//! archives and records what is installed in a versioned JSON document.
//!
//! # Modules
//!
//! - [`download_cache`] - persisted records of downloaded files and packages
//! - [`sync`] - the refresh pipeline and its transport/archive seams
//! - [`config`] - the user configuration file
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod download_cache;
pub mod logging;
pub mod sync;
