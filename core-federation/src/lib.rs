//! # Federation Module
//!
//! Concurrent loading of catalog entities from every configured backend.
//!
//! ## Overview
//!
//! This module provides:
//! - The async [`SourceAdapter`] contract each backend instance implements
//! - [`CatalogAdapter`] for backends that return raw catalog records
//! - [`ResilientSource`], the timeout/retry boundary that turns failures into
//!   empty lists and `SourceFailed` events
//! - [`FanIn`], an exactly-once join over a fixed set of producers
//! - [`AggregationCoordinator`], which schedules loads on a worker pool and
//!   merges their results through the dedupe engine
//!
//! ## Components
//!
//! - `adapter`: adapter traits and per-kind dispatch ([`FederatedKind`])
//! - `resilient`: retry policy at the adapter boundary
//! - `fan_in`: the join primitive
//! - `coordinator`: request lifecycle and shutdown

pub mod adapter;
pub mod coordinator;
pub mod error;
pub mod fan_in;
pub mod resilient;

pub use adapter::{CatalogAdapter, CatalogBackend, FederatedKind, SourceAdapter};
pub use coordinator::{Aggregated, AggregationCoordinator};
pub use error::{FederationError, Result};
pub use fan_in::{FanIn, SlotHandle};
pub use resilient::ResilientSource;
