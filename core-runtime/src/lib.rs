//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the federation crates:
//! - Logging and tracing bootstrap
//! - Configuration (`FederationConfig`) and subsystem tuning
//! - Typed event bus
//!
//! ## Overview
//!
//! Nothing in here is global. Hosts build a [`config::FederationConfig`] once
//! at startup and hand it to the service facade, which passes the pieces down
//! to the components that need them.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AggregationTuning, FederationConfig, ShuffleTuning, SOURCE_PREFERENCE_KEY};
pub use error::{Error, Result};
pub use events::{AggregationEvent, CoreEvent, EventBus, EventStream, ShuffleEvent};
