//! Alert relevance filtering and multi-channel delivery engine.
//!
//! Decides, for every candidate alert directed at a user, whether it should
//! be delivered, through which channels, at what priority and whether it
//! should be held for batched delivery, then carries out that delivery and
//! records the outcome. Invoked in-process; storage, transports and the
//! cache are reached through the trait contracts in [`stores`].
//!
//! The system fails open: a missed legislative alert is considered worse
//! than a redundant one, so internal faults degrade to permissive defaults
//! instead of silent suppression. The only strict blocks are the
//! user-expressed exclusions (disabled types, quiet hours).

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod stores;

pub use config::EngineConfig;
pub use error::{AlertError, Result};
pub use services::{
    DeliveryOrchestrator, EngagementProfileService, FilterEngine, PreferenceService,
};
