//! Configuration and logging shared by the `opencloud` binaries.

pub mod config;
pub mod logging;
