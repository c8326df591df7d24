pub mod aggregate;
pub mod item;
pub mod params;
pub mod runner;

pub use runner::{ConferenceEngine, EngineSettings, ExecutionOutcome, NewConference, RunSummary};
