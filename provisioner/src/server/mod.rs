//! On-device status service

pub mod handlers;
pub mod serve;
