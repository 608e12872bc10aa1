pub mod checks;
pub mod engagement;
pub mod filter;
pub mod orchestrator;
pub mod preferences;
pub mod rules;

pub use engagement::EngagementProfileService;
pub use filter::FilterEngine;
pub use orchestrator::DeliveryOrchestrator;
pub use preferences::PreferenceService;
