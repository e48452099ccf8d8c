//! Document backup

pub mod engine;
