//! On-device bootstrap helpers

pub mod setup;
