//! Script installation

pub mod fsm;
pub mod orchestrator;
pub mod plan;
