//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on
//! `music-federation-workspace` and enable `desktop-shims` to get the SQLite
//! settings store wired into `core-service` without touching each crate.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
