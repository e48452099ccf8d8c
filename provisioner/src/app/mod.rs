//! Application wiring

pub mod console;
pub mod options;
pub mod run;
