// Extraction pipeline: plan, align, export

pub mod aligner;
pub mod export;
pub mod orchestrator;
pub mod planner;
pub mod types;
