//! Built-in handlers.

pub mod cost_analysis;
pub mod general;

pub use cost_analysis::CostAnalysisHandler;
pub use general::GeneralHandler;
