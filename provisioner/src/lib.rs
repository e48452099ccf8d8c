//! rmprov library
//!
//! Installs an ordered plan of scripts on a reMarkable tablet and backs up
//! its document store, over SSH with a wireless and a wired path.

pub mod app;
pub mod backup;
pub mod bootstrap;
pub mod errors;
pub mod filesys;
pub mod install;
pub mod logs;
pub mod observer;
pub mod remote;
pub mod server;
pub mod storage;
pub mod utils;
